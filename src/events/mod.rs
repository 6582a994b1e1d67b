//! Event types for workflow execution.
//!
//! Events are emitted during a run to notify subscribers about node status
//! changes, run completion, errors, and logs. This is the queue a console or
//! log view consumes.

mod node;
mod run;

pub use node::*;
pub use run::*;

use crate::{graph::NodeId, runtime::ExecutionId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for run events.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Run-level events (start, completed, failed, cancelled).
    Run(RunEvent),
    /// Node-level events (running, succeeded, error, skipped).
    Node(NodeEvent),
}

/// Event message containing run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Execution ID that generated this event.
    pub execution_id: ExecutionId,
    /// Node ID that generated this event (empty for run-level events).
    pub nid: NodeId,
    /// The actual event data.
    pub event: GraphEvent,
}

/// Log entry emitted during node execution.
#[derive(Debug, Clone)]
pub struct Log {
    /// Execution ID that generated this log.
    pub execution_id: ExecutionId,
    /// Node ID that generated this log.
    pub nid: NodeId,
    /// Log message content.
    pub content: String,
    /// Timestamp in milliseconds of the log entry.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GraphEvent::Run(RunEvent::Completed(_)) | GraphEvent::Run(RunEvent::Failed(_)) | GraphEvent::Run(RunEvent::Cancelled(_))
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Failed(_)))
    }
}
