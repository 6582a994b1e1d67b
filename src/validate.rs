//! Validation engine: node-level config checks and graph-level structure
//! checks.
//!
//! Both checks are pure functions over the graph snapshot; nothing is
//! mutated. Graph validation gates runnability. Node validation marks
//! individual nodes for inline display but does not by itself block
//! execution of independent branches.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    FlowError, Result,
    graph::{Graph, NodeId},
    registry::TypeRegistry,
};

/// Node types whose re-entrant edges are exempt from the data-flow cycle
/// check. Plain data-flow cycles are invalid.
const CYCLE_EXEMPT_TYPES: [&str; 2] = ["loop", "parallel"];

/// A single validation finding attached to a config field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        field: &str,
        message: &str,
    ) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Outcome of validating one node's configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ValidationState {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationState {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Validates a node instance's configuration against its type definition.
///
/// Delegates to the definition's custom validator when one is supplied.
/// Otherwise applies the default rule: every required input port must have
/// either an incoming connection or a non-empty value in `config[port.name]`
/// (a declared port default also satisfies it).
pub fn validate_node(
    registry: &TypeRegistry,
    graph: &Graph,
    node_id: &NodeId,
) -> ValidationState {
    let Some(node) = graph.get_node(node_id) else {
        return ValidationState::from_errors(vec![ValidationIssue::new("id", &format!("node {} not found", node_id))]);
    };

    let definition = match registry.get(&node.type_key) {
        Ok(d) => d,
        Err(_) => {
            return ValidationState::from_errors(vec![ValidationIssue::new("type", &format!("unknown node type: {}", node.type_key))]);
        }
    };

    if let Some(validator) = &definition.validator {
        return validator(&node.config);
    }

    let mut errors = Vec::new();
    for (port, connection) in graph.inputs_of(node_id) {
        if !port.required || connection.is_some() || port.default_value.is_some() {
            continue;
        }
        let configured = match node.config.get_value(&port.name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !configured {
            errors.push(ValidationIssue::new(&port.name, &format!("{} is required", port.name)));
        }
    }

    ValidationState::from_errors(errors)
}

/// Validates graph-level invariants.
///
/// Checks that every connection resolves to existing node/port ids, that no
/// two connections feed the same input port, and that the data-flow
/// subgraph (excluding loop/parallel control nodes) is acyclic. The first
/// discovered back-edge is reported as `CycleDetected` with the involved
/// node ids.
pub fn validate_graph(graph: &Graph) -> Result<()> {
    let nodes: HashMap<NodeId, _> = graph.nodes().into_iter().map(|n| (n.id.clone(), n)).collect();

    let mut fed_ports = HashSet::new();
    for conn in graph.connections() {
        let source = nodes.get(&conn.source_node_id).ok_or_else(|| FlowError::Runtime(format!("node {} not found", conn.source_node_id)))?;
        let target = nodes.get(&conn.target_node_id).ok_or_else(|| FlowError::Runtime(format!("node {} not found", conn.target_node_id)))?;

        let out_port = source.output_by_id(&conn.source_port_id).ok_or_else(|| FlowError::PortNotFound {
            node: conn.source_node_id.clone(),
            port: conn.source_port_id.clone(),
        })?;
        let in_port = target.input_by_id(&conn.target_port_id).ok_or_else(|| FlowError::PortNotFound {
            node: conn.target_node_id.clone(),
            port: conn.target_port_id.clone(),
        })?;

        if !out_port.data_type.is_compatible(&in_port.data_type) {
            return Err(FlowError::TypeMismatch {
                source_type: out_port.data_type.as_ref().to_string(),
                target_type: in_port.data_type.as_ref().to_string(),
            });
        }

        if !fed_ports.insert((conn.target_node_id.clone(), conn.target_port_id.clone())) {
            return Err(FlowError::DuplicateTarget {
                node: conn.target_node_id.clone(),
                port: in_port.name.clone(),
            });
        }
    }

    detect_cycle(graph, &nodes)
}

/// Depth-first traversal with a recursion-stack membership test.
fn detect_cycle(
    graph: &Graph,
    nodes: &HashMap<NodeId, crate::graph::NodeInstance>,
) -> Result<()> {
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    let connections = graph.connections();
    for conn in &connections {
        let exempt = [&conn.source_node_id, &conn.target_node_id].iter().any(|id| {
            nodes.get(*id).map(|n| CYCLE_EXEMPT_TYPES.contains(&n.type_key.as_str())).unwrap_or(false)
        });
        if !exempt {
            adjacency.entry(&conn.source_node_id).or_default().push(&conn.target_node_id);
        }
    }

    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut stack: Vec<&NodeId> = Vec::new();
    let mut on_stack: HashSet<&NodeId> = HashSet::new();

    fn visit<'a>(
        id: &'a NodeId,
        adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        visited: &mut HashSet<&'a NodeId>,
        stack: &mut Vec<&'a NodeId>,
        on_stack: &mut HashSet<&'a NodeId>,
    ) -> Result<()> {
        visited.insert(id);
        stack.push(id);
        on_stack.insert(id);

        for next in adjacency.get(id).into_iter().flatten() {
            if on_stack.contains(next) {
                // back-edge: report the stack segment forming the cycle
                let start = stack.iter().position(|n| *n == *next).unwrap_or(0);
                return Err(FlowError::CycleDetected {
                    involving: stack[start..].iter().map(|n| (*n).clone()).collect(),
                });
            }
            if !visited.contains(next) {
                visit(next, adjacency, visited, stack, on_stack)?;
            }
        }

        stack.pop();
        on_stack.remove(id);
        Ok(())
    }

    for id in nodes.keys() {
        if !visited.contains(id) {
            visit(id, &adjacency, &mut visited, &mut stack, &mut on_stack)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        Vars,
        graph::Position,
        nodes,
    };

    fn setup() -> (TypeRegistry, Graph) {
        (nodes::builtin_registry(), Graph::new("wf1", "test"))
    }

    #[test]
    fn test_required_input_unsatisfied() {
        let (registry, graph) = setup();
        let node = graph.create_node(&registry, "assert", Position::default()).unwrap();

        let state = validate_node(&registry, &graph, &node.id);
        assert!(!state.is_valid);
        assert_eq!(state.errors[0].field, "actual");
    }

    #[test]
    fn test_required_input_satisfied_by_config() {
        let (registry, graph) = setup();
        let mut node = graph.create_node(&registry, "assert", Position::default()).unwrap();
        node.config.set("actual", "something");
        graph.remove_node(&node.id).unwrap();
        graph.add_instance(node.clone()).unwrap();

        let state = validate_node(&registry, &graph, &node.id);
        assert!(state.is_valid);
    }

    #[test]
    fn test_required_input_satisfied_by_connection() {
        let (registry, graph) = setup();
        let source = graph.create_node(&registry, "variable", Position::default()).unwrap();
        let target = graph.create_node(&registry, "assert", Position::default()).unwrap();
        let out = source.output_by_name("value").unwrap().id.clone();
        let actual = target.inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
        graph.add_connection(&source.id, &out, &target.id, &actual).unwrap();

        let state = validate_node(&registry, &graph, &target.id);
        assert!(state.is_valid);
    }

    #[test]
    fn test_custom_validator_delegation() {
        let (mut registry, graph) = setup();
        let mut def = registry.get("variable").unwrap().clone();
        def.type_key = "picky_variable".to_string();
        def.validator = Some(Arc::new(|config: &Vars| {
            if config.get::<String>("value").is_some() {
                ValidationState::valid()
            } else {
                ValidationState::from_errors(vec![ValidationIssue::new("value", "value must be a string")])
            }
        }));
        registry.register(def).unwrap();

        let node = graph.create_node(&registry, "picky_variable", Position::default()).unwrap();
        let state = validate_node(&registry, &graph, &node.id);
        assert!(!state.is_valid);
        assert_eq!(state.errors[0].field, "value");
    }

    #[test]
    fn test_acyclic_graph_passes() {
        let (registry, graph) = setup();
        let a = graph.create_node(&registry, "variable", Position::default()).unwrap();
        let b = graph.create_node(&registry, "assert", Position::default()).unwrap();
        let out = a.output_by_name("value").unwrap().id.clone();
        let actual = b.inputs.iter().find(|p| p.name == "actual").unwrap().id.clone();
        graph.add_connection(&a.id, &out, &b.id, &actual).unwrap();

        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn test_cycle_detected_with_involved_nodes() {
        let (registry, graph) = setup();
        let a = graph.create_node(&registry, "condition", Position::default()).unwrap();
        let b = graph.create_node(&registry, "condition", Position::default()).unwrap();

        let a_out = a.output_by_name("result").unwrap().id.clone();
        let b_in = b.inputs.iter().find(|p| p.name == "value").unwrap().id.clone();
        let b_out = b.output_by_name("result").unwrap().id.clone();
        let a_in = a.inputs.iter().find(|p| p.name == "value").unwrap().id.clone();

        graph.add_connection(&a.id, &a_out, &b.id, &b_in).unwrap();
        graph.add_connection(&b.id, &b_out, &a.id, &a_in).unwrap();

        let err = validate_graph(&graph).unwrap_err();
        match err {
            FlowError::CycleDetected {
                involving,
            } => {
                assert!(involving.contains(&a.id));
                assert!(involving.contains(&b.id));
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_through_loop_node_is_exempt() {
        let (registry, graph) = setup();
        let cond = graph.create_node(&registry, "condition", Position::default()).unwrap();
        let looper = graph.create_node(&registry, "loop", Position::default()).unwrap();

        let cond_out = cond.output_by_name("true").unwrap().id.clone();
        let loop_in = looper.inputs.iter().find(|p| p.name == "items").unwrap().id.clone();
        let loop_out = looper.output_by_name("results").unwrap().id.clone();
        let cond_in = cond.inputs.iter().find(|p| p.name == "value").unwrap().id.clone();

        graph.add_connection(&cond.id, &cond_out, &looper.id, &loop_in).unwrap();
        graph.add_connection(&looper.id, &loop_out, &cond.id, &cond_in).unwrap();

        assert!(validate_graph(&graph).is_ok());
    }
}
