use serde::{Deserialize, Serialize};

use crate::graph::{Connection, DataType};

/// Wire form of a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionModel {
    pub id: String,
    pub source_node_id: String,
    pub source_port_id: String,
    pub target_node_id: String,
    pub target_port_id: String,
    #[serde(rename = "type", default)]
    pub data_type: DataType,
}

impl From<&Connection> for ConnectionModel {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id.clone(),
            source_node_id: conn.source_node_id.clone(),
            source_port_id: conn.source_port_id.clone(),
            target_node_id: conn.target_node_id.clone(),
            target_port_id: conn.target_port_id.clone(),
            data_type: conn.data_type,
        }
    }
}

impl From<&ConnectionModel> for Connection {
    fn from(model: &ConnectionModel) -> Self {
        Self {
            id: model.id.clone(),
            source_node_id: model.source_node_id.clone(),
            source_port_id: model.source_port_id.clone(),
            target_node_id: model.target_node_id.clone(),
            target_port_id: model.target_port_id.clone(),
            data_type: model.data_type,
        }
    }
}
