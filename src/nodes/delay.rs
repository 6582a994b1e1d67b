//! Delay node: waits a configured duration, passing its input through.

use std::{sync::Arc, time::Duration};

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

pub struct DelayNode;

#[async_trait]
impl NodeExecutor for DelayNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let duration_ms = template::render(node.config.get_value("duration_ms").unwrap_or(&Value::Null), &ctx).as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        let value = template::render(inputs.get_value("value").unwrap_or(&Value::Null), &ctx);
        Ok(ExecutionOutput::success(Vars::new().with("value", value)))
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "delay".to_string(),
        metadata: NodeMetadata::new("Delay", "Waits before passing its input through", NodeCategory::Utility, "#7f8c8d"),
        default_config: Vars::new().with("duration_ms", 1000),
        inputs: vec![Port::new("value", DataType::Any, false)],
        outputs: vec![Port::new("value", DataType::Any, false)],
        executor: Arc::new(DelayNode),
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

    #[tokio::test]
    async fn test_passes_value_through_after_delay() {
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("duration_ms", 5);

        let start = std::time::Instant::now();
        let output = DelayNode.run(&node, &Vars::new().with("value", json!("x")), context()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(output.outputs.get_value("value"), Some(&json!("x")));
    }
}
