//! Workflow interchange document.
//!
//! The structured text form a workflow travels in between the editor, the
//! file system, and the engine. Timestamps are ISO-8601 strings on the
//! wire. Round-tripping a graph through this document reproduces an
//! identical graph model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    FlowError, Result,
    graph::Graph,
    model::{ConnectionModel, NodeModel},
    registry::TypeRegistry,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    pub nodes: Vec<NodeModel>,
    pub connections: Vec<ConnectionModel>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl WorkflowDocument {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowDocument>(s).map_err(|e| FlowError::Convert(format!("invalid workflow document: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(FlowError::from)
    }

    /// Builds a graph from this document.
    ///
    /// Every node's type must be registered; connections are re-checked
    /// against the same invariants the editing surface enforces.
    pub fn to_graph(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Graph> {
        let graph = Graph::new(&self.id, &self.name);

        for node in &self.nodes {
            // fail early on types this registry does not know
            registry.get(&node.type_key)?;
            graph.add_instance(node.to_instance())?;
        }

        for conn in &self.connections {
            graph.insert_connection(conn.into())?;
        }

        Ok(graph)
    }

    /// Captures a graph into a document, stamping `modified` with now.
    pub fn from_graph(
        graph: &Graph,
        metadata: DocumentMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: graph.id.clone(),
            name: graph.name.clone(),
            description: String::new(),
            version: "1.0.0".to_string(),
            nodes: graph.nodes().iter().map(NodeModel::from).collect(),
            connections: graph.connections().iter().map(ConnectionModel::from).collect(),
            metadata,
            created: now,
            modified: now,
        }
    }
}
