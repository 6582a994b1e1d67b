use std::fmt;

use crate::common::Vars;

#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Node entered the running state, with start timestamp.
    Running(i64),
    /// Node finished successfully, with outputs and end timestamp.
    Succeeded(Vars, i64),
    /// Node finished with warnings, with outputs and end timestamp.
    Warning(Vars, i64),
    /// Node failed.
    Error(ErrorReason),
    /// Node was pruned; it never left the idle state.
    Skipped,
    /// Node execution was interrupted by cancellation.
    Stopped(i64),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_, _) => "Succeeded",
            NodeEvent::Warning(_, _) => "Warning",
            NodeEvent::Error(_) => "Error",
            NodeEvent::Skipped => "Skipped",
            NodeEvent::Stopped(_) => "Stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorReason {
    Timeout,
    MissingInput(String),
    Failed(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ErrorReason::Timeout => write!(f, "Timeout"),
            ErrorReason::MissingInput(port) => write!(f, "Missing input: {}", port),
            ErrorReason::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}
