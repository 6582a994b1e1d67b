//! Registry of node type definitions.
//!
//! The registry holds the immutable blueprints for every node kind: ports,
//! default configuration, the executor, and an optional config validator.
//! It is an explicit value constructed at startup and passed by reference to
//! the graph model and the execution engine, so isolated registries can
//! coexist (one per test, for example). It holds no execution state.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    FlowError, Result,
    common::Vars,
    graph::{NodeInstance, NodeStatus, Port, Position},
    runtime::Context,
    utils,
    validate::ValidationState,
};

/// Category a node type is listed under in the palette.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeCategory {
    Http,
    DataTransform,
    ControlFlow,
    Integration,
    Testing,
    Utility,
    #[default]
    Custom,
}

/// Display metadata for a node type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeMetadata {
    pub title: String,
    pub description: String,
    pub category: NodeCategory,
    pub color: String,
}

impl NodeMetadata {
    pub fn new(
        title: &str,
        description: &str,
        category: NodeCategory,
        color: &str,
    ) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            category,
            color: color.to_string(),
        }
    }
}

/// Validator hook for a node type's configuration.
pub type NodeValidator = Arc<dyn Fn(&Vars) -> ValidationState + Send + Sync>;

/// Outcome of one executor invocation.
///
/// Outputs are keyed by output-port name. A port absent from the map emits
/// no value: its connections are pruned and the downstream branch never
/// becomes eligible. This is how conditional routing works.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Terminal status the node should take: success or warning.
    pub status: NodeStatus,
    /// Emitted values, keyed by output-port name.
    pub outputs: Vars,
    /// Diagnostic message accompanying a warning.
    pub message: Option<String>,
}

impl ExecutionOutput {
    /// Create a successful output.
    pub fn success(outputs: Vars) -> Self {
        Self {
            status: NodeStatus::Success,
            outputs,
            message: None,
        }
    }

    /// Create an output that completes the node with a warning.
    pub fn warning(
        outputs: Vars,
        message: String,
    ) -> Self {
        Self {
            status: NodeStatus::Warning,
            outputs,
            message: Some(message),
        }
    }
}

/// The sole seam through which domain logic is injected into the engine.
///
/// Executors are asynchronous units of work: they may suspend on network
/// I/O or timers without blocking other branches of the run. Failure is
/// reported through the `Result`; the engine records it on the node and in
/// the execution context without aborting sibling branches.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput>;
}

/// Immutable blueprint for a kind of node.
#[derive(Clone)]
pub struct NodeTypeDefinition {
    /// Unique key this definition is registered under.
    pub type_key: String,
    /// Display metadata.
    pub metadata: NodeMetadata,
    /// Config every new instance starts from.
    pub default_config: Vars,
    /// Input port blueprints.
    pub inputs: Vec<Port>,
    /// Output port blueprints.
    pub outputs: Vec<Port>,
    /// Executor invoked with resolved inputs during a run.
    pub executor: Arc<dyn NodeExecutor>,
    /// Optional custom config validator; default validation applies when absent.
    pub validator: Option<NodeValidator>,
}

impl NodeTypeDefinition {
    /// Creates a node instance from this blueprint.
    ///
    /// Ports are cloned with freshly generated ids, config starts as a copy
    /// of the defaults, status is idle.
    pub fn instantiate(
        &self,
        position: Position,
    ) -> NodeInstance {
        NodeInstance {
            id: utils::shortid(),
            type_key: self.type_key.clone(),
            position,
            inputs: self.inputs.iter().map(Port::instantiate).collect(),
            outputs: self.outputs.iter().map(Port::instantiate).collect(),
            config: self.default_config.clone(),
            status: NodeStatus::Idle,
            last_result: None,
            last_error: None,
        }
    }
}

/// Registry of node type definitions, keyed by type key.
///
/// Read-mostly process state populated once at startup. Listing preserves
/// registration order.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    definitions: HashMap<String, NodeTypeDefinition>,
    order: Vec<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a definition by its type key.
    ///
    /// Rejects definitions that declare the same port name twice within
    /// inputs or within outputs.
    pub fn register(
        &mut self,
        definition: NodeTypeDefinition,
    ) -> Result<()> {
        Self::check_port_names(&definition.type_key, &definition.inputs)?;
        Self::check_port_names(&definition.type_key, &definition.outputs)?;

        let key = definition.type_key.clone();
        if self.definitions.insert(key.clone(), definition).is_none() {
            self.order.push(key);
        }
        Ok(())
    }

    /// Looks up a definition by type key.
    pub fn get(
        &self,
        type_key: &str,
    ) -> Result<&NodeTypeDefinition> {
        self.definitions.get(type_key).ok_or_else(|| FlowError::UnknownType(type_key.to_string()))
    }

    /// All definitions, in registration order.
    pub fn list(&self) -> Vec<&NodeTypeDefinition> {
        self.order.iter().filter_map(|key| self.definitions.get(key)).collect()
    }

    /// Definitions of one category, in registration order.
    pub fn list_by_category(
        &self,
        category: NodeCategory,
    ) -> Vec<&NodeTypeDefinition> {
        self.list().into_iter().filter(|d| d.metadata.category == category).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn check_port_names(
        type_key: &str,
        ports: &[Port],
    ) -> Result<()> {
        for (i, port) in ports.iter().enumerate() {
            if ports.iter().skip(i + 1).any(|p| p.name == port.name) {
                return Err(FlowError::DuplicatePort {
                    type_key: type_key.to_string(),
                    port: port.name.clone(),
                });
            }
        }
        Ok(())
    }
}
