//! Embedded sub-workflows carried in control-flow node configs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    FlowError, Result,
    common::Vars,
    graph::Graph,
    model::{ConnectionModel, NodeModel},
    registry::TypeRegistry,
};

/// Items a loop or parallel node iterates over: the `items` input first,
/// the config's `items` array second, else `count` synthetic indexes.
pub fn iteration_items(
    config: &Vars,
    inputs: &Vars,
) -> Vec<Value> {
    if let Some(Value::Array(items)) = inputs.get_value("items") {
        return items.clone();
    }
    if let Some(Value::Array(items)) = config.get_value("items") {
        return items.clone();
    }
    let count = config.get::<u64>("count").unwrap_or(0);
    (0..count).map(Value::from).collect()
}

/// Node and connection models a loop or parallel node re-instantiates for
/// every iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubWorkflow {
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub connections: Vec<ConnectionModel>,
}

impl SubWorkflow {
    /// Reads the embedded workflow from a node config's `workflow` key.
    pub fn from_config(config: &Vars) -> Result<Option<Self>> {
        match config.get_value("workflow") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| FlowError::Convert(format!("invalid embedded workflow: {}", e))),
        }
    }

    /// Builds a fresh runnable graph for one iteration.
    pub fn to_graph(
        &self,
        registry: &TypeRegistry,
        parent_nid: &str,
    ) -> Result<Graph> {
        let graph = Graph::new(&format!("{}-subflow", parent_nid), "subflow");
        for node in &self.nodes {
            registry.get(&node.type_key)?;
            graph.add_instance(node.to_instance())?;
        }
        for conn in &self.connections {
            graph.insert_connection(conn.into())?;
        }
        Ok(graph)
    }

    /// Extracts the per-iteration result from the iteration's outputs.
    ///
    /// When the owning node's config names a `collect` node id, that node's
    /// outputs become the result; otherwise the whole output map does.
    pub fn collect(
        config: &Vars,
        outputs: std::collections::HashMap<String, Vars>,
    ) -> Value {
        if let Some(nid) = config.get::<String>("collect") {
            return outputs.get(&nid).cloned().map(Value::from).unwrap_or(Value::Null);
        }
        Value::Object(outputs.into_iter().map(|(nid, vars)| (nid, vars.into())).collect())
    }
}
