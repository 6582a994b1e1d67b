//! Loop node: runs an embedded sub-workflow once per item, sequentially.
//!
//! Each iteration rebuilds the embedded graph, publishes the current item
//! and index as run variables, and dispatches it against a child context.
//! Iteration results are gathered into the `results` output in order.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    FlowError, Result,
    common::Vars,
    dispatcher::{DispatchOptions, RunOutcome, dispatch},
    graph::{DataType, NodeInstance, Port},
    nodes::subflow::{self, SubWorkflow},
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition},
    runtime::Context,
};

pub struct LoopNode;

#[async_trait]
impl NodeExecutor for LoopNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let sub = SubWorkflow::from_config(&node.config)?;
        let items = subflow::iteration_items(&node.config, inputs);
        let item_variable = node.config.get::<String>("item_variable").unwrap_or_else(|| "item".to_string());
        let index_variable = node.config.get::<String>("index_variable").unwrap_or_else(|| "index".to_string());

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            let Some(sub) = &sub else {
                // no embedded workflow: the loop passes items through
                results.push(item);
                continue;
            };

            let child = Arc::new(ctx.child());
            child.set_variable(&item_variable, item);
            child.set_variable(&index_variable, Value::from(index));

            let graph = sub.to_graph(&ctx.registry(), &node.id)?;
            let options = DispatchOptions {
                emit_run_events: false,
                ..Default::default()
            };

            match dispatch(Arc::new(graph), child, options).await? {
                RunOutcome::Completed {
                    outputs,
                } => results.push(SubWorkflow::collect(&node.config, outputs)),
                RunOutcome::Failed {
                    errors, ..
                } => {
                    let cause = errors.into_iter().map(|(nid, msg)| format!("{}: {}", nid, msg)).collect::<Vec<_>>().join("; ");
                    return Err(FlowError::Executor {
                        node: node.id.clone(),
                        cause: format!("iteration {} failed: {}", index, cause),
                    });
                }
                RunOutcome::Cancelled => break,
            }
        }

        Ok(ExecutionOutput::success(Vars::new().with("results", Value::Array(results))))
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "loop".to_string(),
        metadata: NodeMetadata::new("Loop", "Runs an embedded workflow once per item, in order", NodeCategory::ControlFlow, "#2980b9"),
        default_config: Vars::new(),
        inputs: vec![Port::new("items", DataType::Array, false)],
        outputs: vec![Port::new("results", DataType::Array, false)],
        executor: Arc::new(LoopNode),
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

    /// Embedded single-node workflow: a variable emitting `{{item}}`.
    fn echo_workflow() -> (Value, String) {
        let nid = "inner".to_string();
        let workflow = json!({
            "nodes": [{
                "id": nid,
                "type": "variable",
                "outputs": [{"id": "out", "name": "value", "type": "any"}],
                "config": {"value": "{{item}}"}
            }],
            "connections": []
        });
        (workflow, nid)
    }

    #[tokio::test]
    async fn test_iterates_items_in_order() {
        let (workflow, nid) = echo_workflow();
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("workflow", workflow).with("collect", nid);

        let inputs = Vars::new().with("items", json!(["a", "b", "c"]));
        let output = LoopNode.run(&node, &inputs, context()).await.unwrap();

        assert_eq!(
            output.outputs.get_value("results"),
            Some(&json!([{"value": "a"}, {"value": "b"}, {"value": "c"}]))
        );
    }

    #[tokio::test]
    async fn test_count_drives_synthetic_items() {
        let (workflow, nid) = echo_workflow();
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("workflow", workflow).with("collect", nid).with("count", 3);

        let output = LoopNode.run(&node, &Vars::new(), context()).await.unwrap();
        assert_eq!(
            output.outputs.get_value("results"),
            Some(&json!([{"value": 0}, {"value": 1}, {"value": 2}]))
        );
    }

    #[tokio::test]
    async fn test_without_workflow_passes_items_through() {
        let node = definition().instantiate(Default::default());
        let inputs = Vars::new().with("items", json!([1, 2]));

        let output = LoopNode.run(&node, &inputs, context()).await.unwrap();
        assert_eq!(output.outputs.get_value("results"), Some(&json!([1, 2])));
    }

    #[tokio::test]
    async fn test_failing_iteration_fails_the_loop() {
        let workflow = json!({
            "nodes": [{
                "id": "check",
                "type": "assert",
                "inputs": [{"id": "in_actual", "name": "actual", "type": "any", "required": true}],
                "outputs": [],
                "config": {"assertion": "equals", "actual": "{{item}}", "expected": 0}
            }],
            "connections": []
        });
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("workflow", workflow);

        let inputs = Vars::new().with("items", json!([0, 1]));
        let err = LoopNode.run(&node, &inputs, context()).await.unwrap_err();
        assert!(matches!(err, FlowError::Executor { .. }));
    }
}
