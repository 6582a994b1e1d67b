//! Directed, typed edges between node ports.
//!
//! A connection links one node's output port to another node's input port.
//! Fan-out from an output is unrestricted; each input port accepts at most
//! one incoming connection.

use serde::{Deserialize, Serialize};

use crate::graph::{
    node::NodeId,
    port::{DataType, PortId},
};

/// Unique identifier for a connection within a workflow.
pub type ConnectionId = String;

/// Runtime connection between an output port and an input port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Connection {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// ID of the source node.
    pub source_node_id: NodeId,
    /// Output port on the source node.
    pub source_port_id: PortId,
    /// ID of the target node.
    pub target_node_id: NodeId,
    /// Input port on the target node.
    pub target_port_id: PortId,
    /// Data type carried by this connection, compatible with both ports.
    pub data_type: DataType,
}
