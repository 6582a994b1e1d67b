use std::collections::HashMap;

use crate::{common::Vars, graph::NodeId};

#[derive(Debug, Clone)]
pub enum RunEvent {
    Start(RunStartEvent),
    Completed(RunCompletedEvent),
    Failed(RunFailedEvent),
    Cancelled(RunCancelledEvent),
}

impl RunEvent {
    pub fn str(&self) -> &str {
        match self {
            RunEvent::Start(_) => "Running",
            RunEvent::Completed(_) => "Completed",
            RunEvent::Failed(_) => "Failed",
            RunEvent::Cancelled(_) => "Cancelled",
        }
    }
}

/// Event emitted when a run starts
#[derive(Debug, Clone)]
pub struct RunStartEvent {
    /// All node IDs in the workflow for batch initialization
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct RunCompletedEvent {
    pub outputs: HashMap<NodeId, Vars>,
}

#[derive(Debug, Clone)]
pub struct RunFailedEvent {
    /// Errors of the nodes that failed; succeeding nodes still report outputs.
    pub errors: Vec<(NodeId, String)>,
    pub outputs: HashMap<NodeId, Vars>,
}

#[derive(Debug, Clone)]
pub struct RunCancelledEvent {
    pub reason: String,
}
