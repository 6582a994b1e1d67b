//! Mutable workflow graph backed by a petgraph directed graph.
//!
//! The graph owns node instances and the typed connections between their
//! ports. Structural invariants are enforced at mutation time: connection
//! endpoints must resolve to real ports, data types must be compatible, and
//! each input port accepts at most one incoming connection. Cycle checks
//! live in the validation engine, which runs before execution.

use petgraph::{
    Direction,
    graph::DiGraph,
    visit::EdgeRef,
};

use crate::{
    FlowError, Result, ShareLock,
    common::Vars,
    graph::{
        connection::{Connection, ConnectionId},
        node::{NodeId, NodeInstance, NodeStatus, Position},
        port::{DataType, Port, PortId},
    },
    registry::TypeRegistry,
    utils,
};

/// The mutable workflow: node instances, connections, derived adjacency.
///
/// Structural mutation is not safe while a run is in progress; a run always
/// executes against its own deep copy of the graph (see [`Graph::deep_clone`]).
#[derive(Clone)]
pub struct Graph {
    /// Workflow id.
    pub id: String,
    /// Workflow display name.
    pub name: String,
    /// Thread-safe directed graph storing nodes and connections.
    graph: ShareLock<DiGraph<NodeInstance, Connection>>,
}

impl Graph {
    /// create a new empty workflow graph
    pub fn new(
        id: &str,
        name: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            graph: ShareLock::new(DiGraph::new().into()),
        }
    }

    /// Instantiates a node of the given registered type and adds it.
    ///
    /// Ports are cloned from the definition with fresh ids, config starts
    /// as a copy of the defaults, status is idle.
    pub fn create_node(
        &self,
        registry: &TypeRegistry,
        type_key: &str,
        position: Position,
    ) -> Result<NodeInstance> {
        let definition = registry.get(type_key)?;
        let node = definition.instantiate(position);

        let mut graph = self.graph.write().unwrap();
        graph.add_node(node.clone());
        Ok(node)
    }

    /// Adds an already-built node instance, e.g. when loading a document.
    pub fn add_instance(
        &self,
        node: NodeInstance,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();
        if graph.node_indices().any(|idx| graph[idx].id == node.id) {
            return Err(FlowError::Runtime(format!("node id '{}' is duplicated", node.id)));
        }
        graph.add_node(node);
        Ok(())
    }

    /// Duplicates an existing node with fresh ids and reset runtime state.
    /// The duplicate carries no connections.
    pub fn clone_node(
        &self,
        id: &NodeId,
        new_position: Option<Position>,
    ) -> Result<NodeInstance> {
        let node = self.get_node(id).ok_or_else(|| FlowError::Runtime(format!("node {} not found", id)))?;
        let copy = node.duplicate(new_position);

        let mut graph = self.graph.write().unwrap();
        graph.add_node(copy.clone());
        Ok(copy)
    }

    /// Connects an output port of one node to an input port of another.
    ///
    /// Fails with `PortNotFound` when an endpoint does not resolve, with
    /// `TypeMismatch` when the port types are incompatible, and with
    /// `DuplicateTarget` when the input port is already fed.
    pub fn add_connection(
        &self,
        source: &NodeId,
        source_port: &PortId,
        target: &NodeId,
        target_port: &PortId,
    ) -> Result<Connection> {
        let source_node = self.get_node(source).ok_or_else(|| FlowError::Runtime(format!("node {} not found", source)))?;
        let target_node = self.get_node(target).ok_or_else(|| FlowError::Runtime(format!("node {} not found", target)))?;

        let out_port = source_node.output_by_id(source_port).ok_or_else(|| FlowError::PortNotFound {
            node: source.clone(),
            port: source_port.clone(),
        })?;
        let in_port = target_node.input_by_id(target_port).ok_or_else(|| FlowError::PortNotFound {
            node: target.clone(),
            port: target_port.clone(),
        })?;

        if !out_port.data_type.is_compatible(&in_port.data_type) {
            return Err(FlowError::TypeMismatch {
                source_type: out_port.data_type.as_ref().to_string(),
                target_type: in_port.data_type.as_ref().to_string(),
            });
        }

        // the carried type is the narrower of the two sides
        let data_type = if out_port.data_type == DataType::Any {
            in_port.data_type
        } else {
            out_port.data_type
        };

        let connection = Connection {
            id: utils::shortid(),
            source_node_id: source.clone(),
            source_port_id: source_port.clone(),
            target_node_id: target.clone(),
            target_port_id: target_port.clone(),
            data_type,
        };

        self.insert_connection(connection.clone())?;
        Ok(connection)
    }

    /// Inserts a pre-built connection, enforcing the same invariants as
    /// [`Graph::add_connection`]. Used when loading interchange documents.
    pub fn insert_connection(
        &self,
        connection: Connection,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();

        let src_idx = graph
            .node_indices()
            .find(|idx| graph[*idx].id == connection.source_node_id)
            .ok_or_else(|| FlowError::Runtime(format!("node {} not found", connection.source_node_id)))?;
        let dst_idx = graph
            .node_indices()
            .find(|idx| graph[*idx].id == connection.target_node_id)
            .ok_or_else(|| FlowError::Runtime(format!("node {} not found", connection.target_node_id)))?;

        if graph[src_idx].output_by_id(&connection.source_port_id).is_none() {
            return Err(FlowError::PortNotFound {
                node: connection.source_node_id.clone(),
                port: connection.source_port_id.clone(),
            });
        }
        let in_port = graph[dst_idx].input_by_id(&connection.target_port_id).ok_or_else(|| FlowError::PortNotFound {
            node: connection.target_node_id.clone(),
            port: connection.target_port_id.clone(),
        })?;

        // fan-in is disallowed: one writer per input port
        let port_name = in_port.name.clone();
        let already_fed = graph.edges_directed(dst_idx, Direction::Incoming).any(|e| e.weight().target_port_id == connection.target_port_id);
        if already_fed {
            return Err(FlowError::DuplicateTarget {
                node: connection.target_node_id.clone(),
                port: port_name,
            });
        }

        graph.add_edge(src_idx, dst_idx, connection);
        Ok(())
    }

    /// Removes a node and every connection referencing it.
    pub fn remove_node(
        &self,
        id: &NodeId,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();
        let idx = graph.node_indices().find(|idx| graph[*idx].id.eq(id)).ok_or_else(|| FlowError::Runtime(format!("node {} not found", id)))?;
        // petgraph drops incident edges with the node
        graph.remove_node(idx);
        Ok(())
    }

    /// Removes a single connection.
    pub fn remove_connection(
        &self,
        id: &ConnectionId,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();
        let idx = graph.edge_indices().find(|idx| graph[*idx].id.eq(id)).ok_or_else(|| FlowError::Runtime(format!("connection {} not found", id)))?;
        graph.remove_edge(idx);
        Ok(())
    }

    /// get node by id
    pub fn get_node(
        &self,
        id: &NodeId,
    ) -> Option<NodeInstance> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().find(|idx| graph[*idx].id.eq(id)).map(|idx| graph[idx].clone())
    }

    /// get connection by id
    pub fn get_connection(
        &self,
        id: &ConnectionId,
    ) -> Option<Connection> {
        let graph = self.graph.read().unwrap();
        graph.edge_indices().find(|idx| graph[*idx].id.eq(id)).map(|idx| graph[idx].clone())
    }

    /// Ordered input ports of a node with the connection feeding each, if any.
    pub fn inputs_of(
        &self,
        id: &NodeId,
    ) -> Vec<(Port, Option<Connection>)> {
        let graph = self.graph.read().unwrap();
        let Some(idx) = graph.node_indices().find(|idx| graph[*idx].id.eq(id)) else {
            return Vec::new();
        };

        graph[idx]
            .inputs
            .iter()
            .map(|port| {
                let connection = graph.edges_directed(idx, Direction::Incoming).find(|e| e.weight().target_port_id == port.id).map(|e| e.weight().clone());
                (port.clone(), connection)
            })
            .collect()
    }

    /// Ordered output ports of a node with all connections fanning out of each.
    pub fn outputs_of(
        &self,
        id: &NodeId,
    ) -> Vec<(Port, Vec<Connection>)> {
        let graph = self.graph.read().unwrap();
        let Some(idx) = graph.node_indices().find(|idx| graph[*idx].id.eq(id)) else {
            return Vec::new();
        };

        graph[idx]
            .outputs
            .iter()
            .map(|port| {
                let connections = graph
                    .edges_directed(idx, Direction::Outgoing)
                    .filter(|e| e.weight().source_port_id == port.id)
                    .map(|e| e.weight().clone())
                    .collect();
                (port.clone(), connections)
            })
            .collect()
    }

    /// All connections arriving at a node.
    pub fn incoming_connections(
        &self,
        id: &NodeId,
    ) -> Vec<Connection> {
        let graph = self.graph.read().unwrap();
        graph
            .node_indices()
            .find(|idx| graph[*idx].id.eq(id))
            .map(|idx| graph.edges_directed(idx, Direction::Incoming).map(|e| e.weight().clone()).collect())
            .unwrap_or_default()
    }

    /// All connections leaving a node.
    pub fn outgoing_connections(
        &self,
        id: &NodeId,
    ) -> Vec<Connection> {
        let graph = self.graph.read().unwrap();
        graph
            .node_indices()
            .find(|idx| graph[*idx].id.eq(id))
            .map(|idx| graph.edges_directed(idx, Direction::Outgoing).map(|e| e.weight().clone()).collect())
            .unwrap_or_default()
    }

    /// get all node ids
    pub fn node_ids(&self) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().map(|idx| graph[idx].id.clone()).collect()
    }

    /// Snapshot of all node instances.
    pub fn nodes(&self) -> Vec<NodeInstance> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().map(|idx| graph[idx].clone()).collect()
    }

    /// Snapshot of all connections.
    pub fn connections(&self) -> Vec<Connection> {
        let graph = self.graph.read().unwrap();
        graph.edge_indices().map(|idx| graph[idx].clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().unwrap().node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.read().unwrap().edge_count()
    }

    /// Advances a node's status, rejecting illegal transitions.
    pub fn set_status(
        &self,
        id: &NodeId,
        to: NodeStatus,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();
        let idx = graph.node_indices().find(|idx| graph[*idx].id.eq(id)).ok_or_else(|| FlowError::Runtime(format!("node {} not found", id)))?;
        graph[idx].status = graph[idx].status.transition(to)?;
        Ok(())
    }

    /// Replaces a node's configuration.
    pub fn set_config(
        &self,
        id: &NodeId,
        config: Vars,
    ) -> Result<()> {
        let mut graph = self.graph.write().unwrap();
        let idx = graph.node_indices().find(|idx| graph[*idx].id.eq(id)).ok_or_else(|| FlowError::Runtime(format!("node {} not found", id)))?;
        graph[idx].config = config;
        Ok(())
    }

    /// Records a node's emitted outputs.
    pub fn record_result(
        &self,
        id: &NodeId,
        outputs: Vars,
    ) {
        let mut graph = self.graph.write().unwrap();
        if let Some(idx) = graph.node_indices().find(|idx| graph[*idx].id.eq(id)) {
            graph[idx].last_result = Some(outputs);
        }
    }

    /// Records a node's failure message.
    pub fn record_error(
        &self,
        id: &NodeId,
        error: String,
    ) {
        let mut graph = self.graph.write().unwrap();
        if let Some(idx) = graph.node_indices().find(|idx| graph[*idx].id.eq(id)) {
            graph[idx].last_error = Some(error);
        }
    }

    /// Resets every node to idle and clears run results.
    pub fn reset_runtime(&self) {
        let mut graph = self.graph.write().unwrap();
        for idx in graph.node_indices().collect::<Vec<_>>() {
            graph[idx].status = NodeStatus::Idle;
            graph[idx].last_result = None;
            graph[idx].last_error = None;
        }
    }

    /// Deep copy with independent nodes and connections.
    ///
    /// A run executes against such a copy so that editing the original graph
    /// cannot race against status updates.
    pub fn deep_clone(&self) -> Self {
        let copy = Graph::new(&self.id, &self.name);
        {
            let src = self.graph.read().unwrap();
            let mut dst = copy.graph.write().unwrap();
            let mut index_map = std::collections::HashMap::new();

            for idx in src.node_indices() {
                index_map.insert(idx, dst.add_node(src[idx].clone()));
            }
            for edge in src.edge_references() {
                dst.add_edge(index_map[&edge.source()], index_map[&edge.target()], edge.weight().clone());
            }
        }
        copy
    }

    /// Output a human-readable representation of the workflow graph
    pub fn schema(&self) -> String {
        let graph = self.graph.read().unwrap();
        let mut lines = Vec::new();

        lines.push("=== Workflow Graph ===".to_string());
        lines.push(format!("Nodes: {}, Connections: {}", graph.node_count(), graph.edge_count()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for idx in graph.node_indices() {
            let node = &graph[idx];
            lines.push(format!("[{}] {} (status: {})", node.id, node.type_key, node.status.as_ref()));
        }
        lines.push(String::new());

        lines.push("--- Connections ---".to_string());
        for idx in graph.edge_indices() {
            let conn = &graph[idx];
            lines.push(format!(
                "{}.{} --[{}]--> {}.{}",
                conn.source_node_id,
                conn.source_port_id,
                conn.data_type.as_ref(),
                conn.target_node_id,
                conn.target_port_id
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes;

    fn graph_with(
        types: &[&str],
    ) -> (Graph, Vec<NodeInstance>) {
        let registry = nodes::builtin_registry();
        let graph = Graph::new("wf1", "test");
        let nodes = types.iter().map(|t| graph.create_node(&registry, t, Position::default()).unwrap()).collect();
        (graph, nodes)
    }

    #[test]
    fn test_create_node_unknown_type() {
        let registry = nodes::builtin_registry();
        let graph = Graph::new("wf1", "test");
        let err = graph.create_node(&registry, "no_such_type", Position::default()).unwrap_err();
        assert!(matches!(err, FlowError::UnknownType(_)));
    }

    #[test]
    fn test_connect_compatible_ports() {
        let (graph, nodes) = graph_with(&["variable", "assert"]);
        let value_out = nodes[0].output_by_name("value").unwrap().id.clone();
        let actual_in = nodes[1].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();

        let conn = graph.add_connection(&nodes[0].id, &value_out, &nodes[1].id, &actual_in).unwrap();
        assert_eq!(conn.source_node_id, nodes[0].id);
        assert_eq!(graph.connection_count(), 1);
    }

    #[test]
    fn test_connect_type_mismatch() {
        // assert.result is boolean, json_path.data wants an object
        let (graph, nodes) = graph_with(&["assert", "json_path"]);
        let result_out = nodes[0].output_by_name("result").unwrap().id.clone();
        let data_in = nodes[1].inputs.iter().find(|p| p.name == "data").unwrap().id.clone();

        let err = graph.add_connection(&nodes[0].id, &result_out, &nodes[1].id, &data_in).unwrap_err();
        assert!(matches!(err, FlowError::TypeMismatch { .. }));
    }

    #[test]
    fn test_connect_duplicate_target() {
        let (graph, nodes) = graph_with(&["variable", "variable", "assert"]);
        let out0 = nodes[0].output_by_name("value").unwrap().id.clone();
        let out1 = nodes[1].output_by_name("value").unwrap().id.clone();
        let actual_in = nodes[2].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();

        graph.add_connection(&nodes[0].id, &out0, &nodes[2].id, &actual_in).unwrap();
        let err = graph.add_connection(&nodes[1].id, &out1, &nodes[2].id, &actual_in).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateTarget { .. }));
    }

    #[test]
    fn test_connect_port_not_found() {
        let (graph, nodes) = graph_with(&["variable", "assert"]);
        let actual_in = nodes[1].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();

        let err = graph.add_connection(&nodes[0].id, &"missing_port".to_string(), &nodes[1].id, &actual_in).unwrap_err();
        assert!(matches!(err, FlowError::PortNotFound { .. }));
    }

    #[test]
    fn test_remove_node_cascades_connections() {
        let (graph, nodes) = graph_with(&["variable", "assert"]);
        let value_out = nodes[0].output_by_name("value").unwrap().id.clone();
        let actual_in = nodes[1].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
        graph.add_connection(&nodes[0].id, &value_out, &nodes[1].id, &actual_in).unwrap();

        graph.remove_node(&nodes[0].id).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_inputs_of_reports_wired_state() {
        let (graph, nodes) = graph_with(&["variable", "assert"]);
        let value_out = nodes[0].output_by_name("value").unwrap().id.clone();
        let actual_in = nodes[1].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
        graph.add_connection(&nodes[0].id, &value_out, &nodes[1].id, &actual_in).unwrap();

        let inputs = graph.inputs_of(&nodes[1].id);
        let actual = inputs.iter().find(|(p, _)| p.name == "actual").unwrap();
        let expected = inputs.iter().find(|(p, _)| p.name == "expected").unwrap();
        assert!(actual.1.is_some());
        assert!(expected.1.is_none());
    }

    #[test]
    fn test_fan_out_is_allowed() {
        let (graph, nodes) = graph_with(&["variable", "assert", "assert"]);
        let value_out = nodes[0].output_by_name("value").unwrap().id.clone();
        for target in &nodes[1..] {
            let actual_in = target.inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
            graph.add_connection(&nodes[0].id, &value_out, &target.id, &actual_in).unwrap();
        }

        let outputs = graph.outputs_of(&nodes[0].id);
        assert_eq!(outputs[0].1.len(), 2);
    }

    #[test]
    fn test_clone_node_copies_nothing_runtime() {
        let (graph, nodes) = graph_with(&["variable", "assert"]);
        let value_out = nodes[0].output_by_name("value").unwrap().id.clone();
        let actual_in = nodes[1].inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
        graph.add_connection(&nodes[0].id, &value_out, &nodes[1].id, &actual_in).unwrap();

        let copy = graph.clone_node(&nodes[0].id, None).unwrap();
        assert_ne!(copy.id, nodes[0].id);
        assert!(graph.outgoing_connections(&copy.id).is_empty());
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_status_transition_enforced() {
        let (graph, nodes) = graph_with(&["variable"]);
        graph.set_status(&nodes[0].id, NodeStatus::Running).unwrap();
        graph.set_status(&nodes[0].id, NodeStatus::Success).unwrap();
        assert!(graph.set_status(&nodes[0].id, NodeStatus::Running).is_err());
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let (graph, nodes) = graph_with(&["variable"]);
        let copy = graph.deep_clone();
        copy.set_status(&nodes[0].id, NodeStatus::Running).unwrap();

        assert_eq!(graph.get_node(&nodes[0].id).unwrap().status, NodeStatus::Idle);
        assert_eq!(copy.get_node(&nodes[0].id).unwrap().status, NodeStatus::Running);
    }
}
