//! # Apiflow
//!
//! Apiflow is an embeddable node-graph engine for composing and executing
//! API workflows. It provides the headless core of a visual workflow
//! designer: a typed port/connection data model, a registry of node type
//! definitions, a validation layer, and an asynchronous execution engine.
//!
//! ## Core Features
//!
//! - **Explicit Type Registry**: node kinds are registered as immutable
//!   definitions (ports, default config, executor) on a registry value that
//!   is passed by reference, never global state
//! - **Typed Graph Model**: connections carry a `DataType` and are checked
//!   for port existence, type compatibility, and single-writer inputs
//! - **Async Execution**: powered by `tokio`, independent branches run
//!   concurrently in waves with a configurable in-flight bound
//! - **Failure Isolation**: a failing node prunes only its own downstream
//!   branch; siblings keep running and the run reports per-node outcomes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use apiflow::{EngineBuilder, WorkflowDocument, nodes};
//!
//! let engine = EngineBuilder::new().registry(nodes::builtin_registry()).build()?;
//! engine.launch();
//!
//! let document = WorkflowDocument::from_json(json_str)?;
//! let execution_id = engine.start_run(&document)?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod graph;
mod model;
pub mod nodes;
mod registry;
mod runtime;
mod utils;
mod validate;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::Config;
pub use dispatcher::{DispatchOptions, RunOutcome};
pub use engine::Engine;
pub use error::FlowError;
pub use events::{ErrorReason, Event, GraphEvent, Log, Message, NodeEvent, RunEvent};
pub use graph::{Connection, DataType, Graph, NodeInstance, NodeStatus, Port, PortId, Position};
pub use model::{ConnectionModel, DocumentMetadata, NodeModel, PortModel, WorkflowDocument};
pub use registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition, NodeValidator, TypeRegistry};
pub use runtime::{ChannelEvent, ChannelOptions, Context, ExecutionId, Run};
pub use validate::{ValidationIssue, ValidationState, validate_graph, validate_node};

/// Result type alias for Apiflow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
