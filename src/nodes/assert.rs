//! Assert node: checks a value during a run.
//!
//! A failing hard assertion fails the node (and prunes its dependents); a
//! soft assertion downgrades the failure to a warning so the branch keeps
//! running.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    FlowError, Result,
    common::Vars,
    graph::{DataType, NodeInstance, Port},
    nodes::template,
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition},
    runtime::Context,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
enum Assertion {
    Truthy,
    Equals,
    NotEquals,
    Exists,
    Contains,
    Matches,
}

pub struct AssertNode;

#[async_trait]
impl NodeExecutor for AssertNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let actual = template::render(inputs.get_value("actual").unwrap_or(&Value::Null), &ctx);
        let expected = template::render(inputs.get_value("expected").or_else(|| node.config.get_value("expected")).unwrap_or(&Value::Null), &ctx);

        let assertion_key = node.config.get::<String>("assertion").unwrap_or_else(|| "truthy".to_string());
        let assertion: Assertion = assertion_key.parse().map_err(|_| FlowError::Executor {
            node: node.id.clone(),
            cause: format!("unknown assertion: {}", assertion_key),
        })?;

        let passed = check(assertion, &actual, &expected).map_err(|cause| FlowError::Executor {
            node: node.id.clone(),
            cause,
        })?;

        let outputs = Vars::new().with("result", passed).with("pass", actual.clone());
        if passed {
            return Ok(ExecutionOutput::success(outputs));
        }

        let message = format!("assertion '{}' failed: actual {} expected {}", assertion.as_ref(), actual, expected);
        if node.config.get::<bool>("soft").unwrap_or(false) {
            Ok(ExecutionOutput::warning(outputs, message))
        } else {
            Err(FlowError::Executor {
                node: node.id.clone(),
                cause: message,
            })
        }
    }
}

fn check(
    assertion: Assertion,
    actual: &Value,
    expected: &Value,
) -> std::result::Result<bool, String> {
    match assertion {
        Assertion::Truthy => Ok(is_truthy(actual)),
        Assertion::Equals => Ok(actual == expected),
        Assertion::NotEquals => Ok(actual != expected),
        Assertion::Exists => Ok(!actual.is_null()),
        Assertion::Contains => match actual {
            Value::String(s) => expected.as_str().map(|needle| s.contains(needle)).ok_or_else(|| "contains on a string requires a string".to_string()),
            Value::Array(items) => Ok(items.contains(expected)),
            _ => Err("contains requires a string or array".to_string()),
        },
        Assertion::Matches => {
            let haystack = actual.as_str().ok_or_else(|| "matches requires a string value".to_string())?;
            let pattern = expected.as_str().ok_or_else(|| "matches requires a string pattern".to_string())?;
            let regex = regex::Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
            Ok(regex.is_match(haystack))
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "assert".to_string(),
        metadata: NodeMetadata::new("Assert", "Checks a value; failures stop the branch unless marked soft", NodeCategory::Testing, "#c0392b"),
        default_config: Vars::new().with("assertion", "truthy"),
        inputs: vec![Port::new("actual", DataType::Any, true), Port::new("expected", DataType::Any, false)],
        outputs: vec![Port::new("result", DataType::Boolean, false), Port::new("pass", DataType::Any, false)],
        executor: Arc::new(AssertNode),
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

    fn node_with(config: Vars) -> NodeInstance {
        let mut node = definition().instantiate(Default::default());
        node.config = config;
        node
    }

    #[tokio::test]
    async fn test_passing_assertion_succeeds() {
        let node = node_with(Vars::new().with("assertion", "equals"));
        let inputs = Vars::new().with("actual", 7).with("expected", 7);

        let output = AssertNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Success);
        assert_eq!(output.outputs.get::<bool>("result"), Some(true));
        assert_eq!(output.outputs.get_value("pass"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_hard_failure_is_an_error() {
        let node = node_with(Vars::new().with("assertion", "equals"));
        let inputs = Vars::new().with("actual", 7).with("expected", 8);

        let err = AssertNode.run(&node, &inputs, context()).await.unwrap_err();
        assert!(matches!(err, FlowError::Executor { .. }));
    }

    #[tokio::test]
    async fn test_soft_failure_warns() {
        let node = node_with(Vars::new().with("assertion", "equals").with("soft", true));
        let inputs = Vars::new().with("actual", 7).with("expected", 8);

        let output = AssertNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Warning);
        assert_eq!(output.outputs.get::<bool>("result"), Some(false));
        assert!(output.message.is_some());
    }

    #[tokio::test]
    async fn test_default_assertion_is_truthy() {
        let node = node_with(definition().default_config.clone());
        let output = AssertNode.run(&node, &Vars::new().with("actual", "non-empty"), context()).await.unwrap();
        assert_eq!(output.status, NodeStatus::Success);
    }

    #[test]
    fn test_truthiness_table() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(0.5)));
    }
}
