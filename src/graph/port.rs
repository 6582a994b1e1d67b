//! Typed input/output slots on nodes.
//!
//! Every connection endpoint is a port. Ports carry the data type contract
//! that connection creation and graph validation enforce.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils;

/// Unique identifier for a port within a node instance.
pub type PortId = String;

/// Data types that can flow between nodes.
///
/// `Any` is the escape hatch: it is compatible with every other type on
/// either side of a connection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    #[default]
    Any,
    HttpRequest,
    HttpResponse,
    File,
    Stream,
}

impl DataType {
    /// Two port types are compatible when they are identical or either side
    /// is `Any`.
    pub fn is_compatible(
        &self,
        other: &DataType,
    ) -> bool {
        self == other || *self == DataType::Any || *other == DataType::Any
    }
}

/// A named, typed input or output slot on a node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Port {
    /// Unique port id within the owning node.
    pub id: PortId,
    /// Port name; input values and emitted outputs are keyed by this name.
    pub name: String,
    /// Data type contract for connections touching this port.
    pub data_type: DataType,
    /// Required inputs must resolve to a value before the node can run.
    pub required: bool,
    /// Fallback value when neither a connection nor config supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Port {
    pub fn new(
        name: &str,
        data_type: DataType,
        required: bool,
    ) -> Self {
        Self {
            id: utils::shortid(),
            name: name.to_string(),
            data_type,
            required,
            default_value: None,
        }
    }

    pub fn with_default(
        mut self,
        value: Value,
    ) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Clones the port with a freshly generated id.
    ///
    /// Instances never share port ids with their type definition or with
    /// each other.
    pub fn instantiate(&self) -> Self {
        Self {
            id: utils::shortid(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_rules() {
        assert!(DataType::String.is_compatible(&DataType::String));
        assert!(DataType::Any.is_compatible(&DataType::Number));
        assert!(DataType::HttpResponse.is_compatible(&DataType::Any));
        assert!(!DataType::Number.is_compatible(&DataType::Boolean));
        assert!(!DataType::Object.is_compatible(&DataType::Array));
    }

    #[test]
    fn test_instantiate_gets_fresh_id() {
        let port = Port::new("value", DataType::String, true);
        let copy = port.instantiate();
        assert_ne!(port.id, copy.id);
        assert_eq!(port.name, copy.name);
        assert_eq!(port.data_type, copy.data_type);
    }

    #[test]
    fn test_data_type_wire_form() {
        let v = serde_json::to_string(&DataType::HttpResponse).unwrap();
        assert_eq!(v, "\"http_response\"");
        assert_eq!(DataType::Any.as_ref(), "any");
    }
}
