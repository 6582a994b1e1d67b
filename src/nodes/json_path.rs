//! JSON path node: extracts a value from an object by a dotted path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    graph::{DataType, NodeInstance, Port},
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition},
    runtime::Context,
};

pub struct JsonPathNode;

#[async_trait]
impl NodeExecutor for JsonPathNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        _ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let data = inputs.get_value("data").cloned().unwrap_or(Value::Null);
        let path = inputs.get::<String>("path").or_else(|| node.config.get::<String>("path")).unwrap_or_default();

        match lookup(&data, &path) {
            Some(value) => Ok(ExecutionOutput::success(Vars::new().with("result", value))),
            None => match node.config.get_value("default_value") {
                Some(fallback) if !fallback.is_null() => Ok(ExecutionOutput::success(Vars::new().with("result", fallback.clone()))),
                _ => Ok(ExecutionOutput::warning(
                    Vars::new().with("result", Value::Null),
                    format!("path '{}' not found", path),
                )),
            },
        }
    }
}

/// Resolves a dotted path with optional `[index]` suffixes, e.g.
/// `items[0].name`. A leading `$.` is accepted and ignored.
fn lookup(
    data: &Value,
    path: &str,
) -> Option<Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() {
        return Some(data.clone());
    }

    let mut current = data.clone();
    for segment in path.split('.') {
        let (name, indexes) = parse_segment(segment)?;
        if !name.is_empty() {
            current = current.get(name)?.clone();
        }
        for index in indexes {
            current = current.get(index)?.clone();
        }
    }
    Some(current)
}

fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    let bracket = segment.find('[').unwrap_or(segment.len());
    let name = &segment[..bracket];

    let mut indexes = Vec::new();
    let mut rest = &segment[bracket..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        indexes.push(stripped[..close].parse().ok()?);
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return None;
    }
    Some((name, indexes))
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "json_path".to_string(),
        metadata: NodeMetadata::new("JSON Path", "Extracts a value from an object by path", NodeCategory::DataTransform, "#16a085"),
        default_config: Vars::new(),
        inputs: vec![Port::new("data", DataType::Object, true), Port::new("path", DataType::String, false)],
        outputs: vec![Port::new("result", DataType::Any, false)],
        executor: Arc::new(JsonPathNode),
        validator: None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{graph::NodeStatus, nodes, runtime::Channel, utils};

    fn context() -> Arc<Context> {
        let registry = Arc::new(nodes::builtin_registry());
        let channel = Arc::new(Channel::new(tokio::runtime::Handle::current()));
        Arc::new(Context::new("wf-test", utils::longid(), registry, channel))
    }

    #[test]
    fn test_lookup_paths() {
        let data = json!({"user": {"name": "alice", "pets": [{"kind": "cat"}, {"kind": "dog"}]}});

        assert_eq!(lookup(&data, "user.name"), Some(json!("alice")));
        assert_eq!(lookup(&data, "user.pets[1].kind"), Some(json!("dog")));
        assert_eq!(lookup(&data, "$.user.name"), Some(json!("alice")));
        assert_eq!(lookup(&data, ""), Some(data.clone()));
        assert_eq!(lookup(&data, "user.age"), None);
        assert_eq!(lookup(&data, "user.pets[9]"), None);
    }

    #[tokio::test]
    async fn test_extracts_from_input() {
        let node = definition().instantiate(Default::default());
        let inputs = Vars::new().with("data", json!({"a": {"b": 7}})).with("path", "a.b");

        let output = JsonPathNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Success);
        assert_eq!(output.outputs.get_value("result"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_missing_path_warns_with_null() {
        let node = definition().instantiate(Default::default());
        let inputs = Vars::new().with("data", json!({"a": 1})).with("path", "b.c");

        let output = JsonPathNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Warning);
        assert_eq!(output.outputs.get_value("result"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_missing_path_uses_default_value() {
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("default_value", "n/a");
        let inputs = Vars::new().with("data", json!({"a": 1})).with("path", "b.c");

        let output = JsonPathNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Success);
        assert_eq!(output.outputs.get_value("result"), Some(&json!("n/a")));
    }
}
