//! Parallel node: runs an embedded sub-workflow concurrently per item.
//!
//! Iterations run against isolated variable scopes so their item variables
//! cannot race. Results keep item order regardless of completion order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
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

pub struct ParallelNode;

#[async_trait]
impl NodeExecutor for ParallelNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let Some(sub) = SubWorkflow::from_config(&node.config)? else {
            let items = subflow::iteration_items(&node.config, inputs);
            return Ok(ExecutionOutput::success(Vars::new().with("results", Value::Array(items))));
        };

        let items = subflow::iteration_items(&node.config, inputs);
        let item_variable = node.config.get::<String>("item_variable").unwrap_or_else(|| "item".to_string());
        let index_variable = node.config.get::<String>("index_variable").unwrap_or_else(|| "index".to_string());

        let mut iterations = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let child = Arc::new(ctx.child_isolated());
            child.set_variable(&item_variable, item);
            child.set_variable(&index_variable, Value::from(index));

            let graph = Arc::new(sub.to_graph(&ctx.registry(), &node.id)?);
            let options = DispatchOptions {
                emit_run_events: false,
                ..Default::default()
            };
            iterations.push(async move { dispatch(graph, child, options).await });
        }

        let mut results = Vec::with_capacity(iterations.len());
        for (index, outcome) in join_all(iterations).await.into_iter().enumerate() {
            match outcome? {
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
                RunOutcome::Cancelled => results.push(Value::Null),
            }
        }

        Ok(ExecutionOutput::success(Vars::new().with("results", Value::Array(results))))
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "parallel".to_string(),
        metadata: NodeMetadata::new("Parallel", "Runs an embedded workflow concurrently per item", NodeCategory::ControlFlow, "#27ae60"),
        default_config: Vars::new(),
        inputs: vec![Port::new("items", DataType::Array, false)],
        outputs: vec![Port::new("results", DataType::Array, false)],
        executor: Arc::new(ParallelNode),
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
    async fn test_results_keep_item_order() {
        // later items sleep less, so completion order is reversed
        let workflow = json!({
            "nodes": [
                {
                    "id": "wait",
                    "type": "delay",
                    "inputs": [{"id": "in_v", "name": "value", "type": "any"}],
                    "outputs": [{"id": "out_v", "name": "value", "type": "any"}],
                    "config": {"duration_ms": "{{item}}", "value": "{{item}}"}
                }
            ],
            "connections": []
        });

        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("workflow", workflow).with("collect", "wait");

        let inputs = Vars::new().with("items", json!([30, 20, 10]));
        let output = ParallelNode.run(&node, &inputs, context()).await.unwrap();

        let results = output.outputs.get_value("results").cloned().unwrap();
        let order: Vec<_> = results.as_array().unwrap().iter().map(|r| r["value"].clone()).collect();
        assert_eq!(order, vec![json!(30), json!(20), json!(10)]);
    }

    #[tokio::test]
    async fn test_isolated_item_variables() {
        let workflow = json!({
            "nodes": [{
                "id": "emit",
                "type": "variable",
                "outputs": [{"id": "out", "name": "value", "type": "any"}],
                "config": {"value": "{{item}}"}
            }],
            "connections": []
        });

        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("workflow", workflow).with("collect", "emit");

        let inputs = Vars::new().with("items", json!(["a", "b", "c", "d"]));
        let output = ParallelNode.run(&node, &inputs, context()).await.unwrap();

        assert_eq!(
            output.outputs.get_value("results"),
            Some(&json!([{"value": "a"}, {"value": "b"}, {"value": "c"}, {"value": "d"}]))
        );
    }

    #[tokio::test]
    async fn test_without_workflow_passes_items_through() {
        let node = definition().instantiate(Default::default());
        let output = ParallelNode.run(&node, &Vars::new().with("items", json!([1, 2])), context()).await.unwrap();
        assert_eq!(output.outputs.get_value("results"), Some(&json!([1, 2])));
    }
}
