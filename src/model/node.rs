use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    common::Vars,
    graph::{DataType, NodeInstance, NodeStatus, Port, Position},
};

/// Wire form of a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortModel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl From<&Port> for PortModel {
    fn from(port: &Port) -> Self {
        Self {
            id: port.id.clone(),
            name: port.name.clone(),
            data_type: port.data_type,
            required: port.required,
            default_value: port.default_value.clone(),
        }
    }
}

impl From<&PortModel> for Port {
    fn from(model: &PortModel) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            data_type: model.data_type,
            required: model.required,
            default_value: model.default_value.clone(),
        }
    }
}

/// Wire form of a node instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub type_key: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub inputs: Vec<PortModel>,
    #[serde(default)]
    pub outputs: Vec<PortModel>,
    #[serde(default)]
    pub config: Value,
}

impl NodeModel {
    /// Rebuilds a node instance with idle status and no run results.
    pub fn to_instance(&self) -> NodeInstance {
        NodeInstance {
            id: self.id.clone(),
            type_key: self.type_key.clone(),
            position: self.position,
            inputs: self.inputs.iter().map(Into::into).collect(),
            outputs: self.outputs.iter().map(Into::into).collect(),
            config: Vars::from(self.config.clone()),
            status: NodeStatus::Idle,
            last_result: None,
            last_error: None,
        }
    }
}

impl From<&NodeInstance> for NodeModel {
    fn from(node: &NodeInstance) -> Self {
        Self {
            id: node.id.clone(),
            type_key: node.type_key.clone(),
            position: node.position,
            inputs: node.inputs.iter().map(PortModel::from).collect(),
            outputs: node.outputs.iter().map(PortModel::from).collect(),
            config: node.config.clone().into(),
        }
    }
}
