//! Node instances placed in a workflow graph.
//!
//! An instance is a configurable occurrence of a registered node type. It
//! carries its own port copies (fresh ids), a config map seeded from the
//! type's defaults, and runtime status mutated only by the execution engine.

use serde::{Deserialize, Serialize};

use crate::{
    FlowError, Result,
    common::Vars,
    graph::port::Port,
    utils,
};

/// node id
pub type NodeId = String;

/// Canvas position of a node, kept for the editing surface.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }
}

/// Execution status of a node instance.
///
/// This is a closed state machine: `idle -> running -> {success | error |
/// warning}`, with a reset edge back to `idle` and a direct `idle -> error`
/// edge for nodes that fail before their executor starts (unresolvable
/// inputs). Illegal transitions such as `success -> running` are rejected
/// at runtime.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Warning,
}

impl NodeStatus {
    /// Validates a transition, returning the new status or an error.
    pub fn transition(
        self,
        to: NodeStatus,
    ) -> Result<NodeStatus> {
        let allowed = match (self, to) {
            // re-entering idle resets the node for a fresh run
            (_, NodeStatus::Idle) => true,
            (NodeStatus::Idle, NodeStatus::Running) => true,
            // input resolution can fail a node before it ever runs
            (NodeStatus::Idle, NodeStatus::Error) => true,
            (NodeStatus::Running, NodeStatus::Success) => true,
            (NodeStatus::Running, NodeStatus::Error) => true,
            (NodeStatus::Running, NodeStatus::Warning) => true,
            (NodeStatus::Idle, _) => false,
            (NodeStatus::Running, _) => false,
            (NodeStatus::Success, _) => false,
            (NodeStatus::Error, _) => false,
            (NodeStatus::Warning, _) => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(FlowError::Runtime(format!("illegal node status transition: {} -> {}", self.as_ref(), to.as_ref())))
        }
    }

    /// Terminal statuses of a single run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Error | NodeStatus::Warning)
    }
}

/// A placed, configurable occurrence of a node type inside a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeInstance {
    /// node id
    pub id: NodeId,
    /// key of the node type definition in the registry
    pub type_key: String,
    /// canvas position
    pub position: Position,
    /// input ports, cloned from the definition with fresh ids
    pub inputs: Vec<Port>,
    /// output ports, cloned from the definition with fresh ids
    pub outputs: Vec<Port>,
    /// node configuration, seeded from the definition's defaults
    pub config: Vars,
    /// execution status, mutated only by the execution engine
    #[serde(default)]
    pub status: NodeStatus,
    /// outputs of the most recent execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<Vars>,
    /// error message of the most recent execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl NodeInstance {
    /// Duplicates this node with fresh node/port ids and reset runtime
    /// fields. Connections are never copied.
    pub fn duplicate(
        &self,
        position: Option<Position>,
    ) -> Self {
        Self {
            id: utils::shortid(),
            type_key: self.type_key.clone(),
            position: position.unwrap_or(Position::new(self.position.x + 20.0, self.position.y + 20.0)),
            inputs: self.inputs.iter().map(Port::instantiate).collect(),
            outputs: self.outputs.iter().map(Port::instantiate).collect(),
            config: self.config.clone(),
            status: NodeStatus::Idle,
            last_result: None,
            last_error: None,
        }
    }

    /// Finds an input port by id.
    pub fn input_by_id(
        &self,
        port_id: &str,
    ) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    /// Finds an output port by id.
    pub fn output_by_id(
        &self,
        port_id: &str,
    ) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == port_id)
    }

    /// Finds an output port by name.
    pub fn output_by_name(
        &self,
        name: &str,
    ) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::port::DataType;

    #[test]
    fn test_status_happy_path() {
        let s = NodeStatus::Idle;
        let s = s.transition(NodeStatus::Running).unwrap();
        let s = s.transition(NodeStatus::Success).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_status_illegal_transitions() {
        assert!(NodeStatus::Idle.transition(NodeStatus::Success).is_err());
        assert!(NodeStatus::Success.transition(NodeStatus::Running).is_err());
        assert!(NodeStatus::Error.transition(NodeStatus::Warning).is_err());
        assert!(NodeStatus::Running.transition(NodeStatus::Running).is_err());
    }

    #[test]
    fn test_status_error_before_running() {
        assert!(NodeStatus::Idle.transition(NodeStatus::Error).is_ok());
    }

    #[test]
    fn test_status_reset_to_idle() {
        assert!(NodeStatus::Success.transition(NodeStatus::Idle).is_ok());
        assert!(NodeStatus::Error.transition(NodeStatus::Idle).is_ok());
    }

    #[test]
    fn test_duplicate_resets_runtime_fields() {
        let node = NodeInstance {
            id: "n1".to_string(),
            type_key: "variable".to_string(),
            position: Position::new(10.0, 10.0),
            inputs: vec![Port::new("in", DataType::Any, false)],
            outputs: vec![Port::new("out", DataType::Any, false)],
            config: Vars::new().with("value", "x"),
            status: NodeStatus::Success,
            last_result: Some(Vars::new().with("out", 1)),
            last_error: Some("boom".to_string()),
        };

        let copy = node.duplicate(None);
        assert_ne!(copy.id, node.id);
        assert_ne!(copy.inputs[0].id, node.inputs[0].id);
        assert_ne!(copy.outputs[0].id, node.outputs[0].id);
        assert_eq!(copy.status, NodeStatus::Idle);
        assert!(copy.last_result.is_none());
        assert!(copy.last_error.is_none());
        assert_eq!(copy.config, node.config);
    }

    #[test]
    fn test_duplicate_config_is_independent() {
        let node = NodeInstance {
            id: "n1".to_string(),
            type_key: "variable".to_string(),
            position: Position::default(),
            inputs: vec![],
            outputs: vec![],
            config: Vars::new().with("value", "x"),
            status: NodeStatus::Idle,
            last_result: None,
            last_error: None,
        };

        let mut copy = node.duplicate(None);
        copy.config.set("value", "changed");
        assert_eq!(node.config.get::<String>("value"), Some("x".to_string()));
    }
}
