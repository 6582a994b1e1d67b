//! Error types for Apiflow.
//!
//! All errors in Apiflow are represented by the `FlowError` enum. Structural
//! errors (unknown types, bad connections, cycles) are surfaced synchronously
//! to the caller of the operation that triggered them; per-node runtime
//! failures during a run are captured into the execution context instead and
//! never abort sibling branches.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::NodeId;

/// Unified error type for all Apiflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Engine-level errors (startup, shutdown, run lifecycle).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, interchange documents).
    #[error("{0}")]
    Convert(String),

    /// Registry lookup miss: the node type key is not registered.
    #[error("unknown node type '{0}'")]
    UnknownType(String),

    /// A node type definition declares the same port name twice on one side.
    #[error("duplicate port '{port}' on node type '{type_key}'")]
    DuplicatePort {
        type_key: String,
        port: String,
    },

    /// A second connection targets an input port that is already fed.
    #[error("input port '{port}' of node '{node}' already has a connection")]
    DuplicateTarget {
        node: NodeId,
        port: String,
    },

    /// A connection endpoint does not resolve to a port on its node.
    #[error("port '{port}' not found on node '{node}'")]
    PortNotFound {
        node: NodeId,
        port: String,
    },

    /// The two endpoints of a connection carry incompatible data types.
    #[error("incompatible data types: {source_type} -> {target_type}")]
    TypeMismatch {
        source_type: String,
        target_type: String,
    },

    /// The data-flow subgraph contains a cycle outside loop/parallel nodes.
    #[error("cycle detected involving nodes {involving:?}")]
    CycleDetected {
        involving: Vec<NodeId>,
    },

    /// A required input port resolved to no value at execution time.
    #[error("missing required input '{port}' on node '{node}'")]
    MissingInput {
        node: NodeId,
        port: String,
    },

    /// The graph failed pre-flight validation; no executor was invoked.
    #[error("graph is not runnable: {0}")]
    GraphInvalid(String),

    /// Config-level validation failure attached to a specific field.
    #[error("validation failed on '{field}': {message}")]
    Validation {
        field: String,
        message: String,
    },

    /// Raised by a node's own executor logic during a run.
    #[error("node '{node}' failed: {cause}")]
    Executor {
        node: NodeId,
        cause: String,
    },

    /// Runtime errors that are not tied to a single node.
    #[error("{0}")]
    Runtime(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<FlowError> for String {
    fn from(val: FlowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FlowError {
    fn from(error: std::io::Error) -> Self {
        FlowError::IoError(error.to_string())
    }
}

impl From<FlowError> for std::io::Error {
    fn from(val: FlowError) -> Self {
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(error: serde_json::Error) -> Self {
        FlowError::Convert(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for FlowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        FlowError::Validation {
            field: error.instance_path().to_string(),
            message: error.to_string(),
        }
    }
}
