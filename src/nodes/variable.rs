//! Variable node: emits a configured value, optionally publishing it as a
//! run variable.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    graph::{DataType, NodeInstance, Port},
    nodes::template,
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition},
    runtime::Context,
};

pub struct VariableNode;

#[async_trait]
impl NodeExecutor for VariableNode {
    async fn run(
        &self,
        node: &NodeInstance,
        _inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let raw = node.config.get_value("value").cloned().unwrap_or(Value::Null);
        let value = template::render(&raw, &ctx);

        if let Some(name) = node.config.get::<String>("name")
            && !name.is_empty()
        {
            ctx.set_variable(&name, value.clone());
        }

        Ok(ExecutionOutput::success(Vars::new().with("value", value)))
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "variable".to_string(),
        metadata: NodeMetadata::new("Variable", "Emits a configured value and optionally stores it as a run variable", NodeCategory::Utility, "#8e44ad"),
        default_config: Vars::new(),
        inputs: vec![],
        outputs: vec![Port::new("value", DataType::Any, false)],
        executor: Arc::new(VariableNode),
        validator: None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{nodes, runtime::Channel, utils};

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
    async fn test_emits_configured_value() {
        let node = node_with(Vars::new().with("value", json!({"k": 1})));
        let output = VariableNode.run(&node, &Vars::new(), context()).await.unwrap();
        assert_eq!(output.outputs.get_value("value"), Some(&json!({"k": 1})));
    }

    #[tokio::test]
    async fn test_publishes_named_variable() {
        let ctx = context();
        let node = node_with(Vars::new().with("value", "token-123").with("name", "auth_token"));
        VariableNode.run(&node, &Vars::new(), ctx.clone()).await.unwrap();
        assert_eq!(ctx.get_variable("auth_token"), Some(json!("token-123")));
    }

    #[tokio::test]
    async fn test_interpolates_run_variables() {
        let ctx = context();
        ctx.set_variable("base_url", json!("https://api.example.com"));
        let node = node_with(Vars::new().with("value", "{{base_url}}/users"));

        let output = VariableNode.run(&node, &Vars::new(), ctx).await.unwrap();
        assert_eq!(output.outputs.get_value("value"), Some(&json!("https://api.example.com/users")));
    }
}
