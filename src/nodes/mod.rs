//! Built-in node types.
//!
//! Each module contributes one node type definition: its ports, default
//! config, executor, and (where useful) a config validator. Everything here
//! goes through the same [`TypeRegistry`] seam as user-defined types.

mod assert;
mod condition;
mod delay;
mod http_request;
mod json_path;
mod r#loop;
mod parallel;
mod subflow;
mod template;
mod variable;

pub use assert::AssertNode;
pub use condition::ConditionNode;
pub use delay::DelayNode;
pub use http_request::HttpRequestNode;
pub use json_path::JsonPathNode;
pub use parallel::ParallelNode;
pub use r#loop::LoopNode;
pub use subflow::SubWorkflow;
pub use template::{render, render_str};
pub use variable::VariableNode;

use crate::registry::TypeRegistry;

/// Registry preloaded with every built-in node type.
///
/// Registration order drives palette order.
pub fn builtin_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    for definition in [
        variable::definition(),
        http_request::definition(),
        json_path::definition(),
        condition::definition(),
        assert::definition(),
        delay::definition(),
        r#loop::definition(),
        parallel::definition(),
    ] {
        // builtin definitions carry unique port names per side
        registry.register(definition).unwrap();
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeCategory;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 8);

        let keys: Vec<&str> = registry.list().iter().map(|d| d.type_key.as_str()).collect();
        assert_eq!(keys, vec!["variable", "http_request", "json_path", "condition", "assert", "delay", "loop", "parallel"]);
    }

    #[test]
    fn test_categories_are_populated() {
        let registry = builtin_registry();
        assert_eq!(registry.list_by_category(NodeCategory::ControlFlow).len(), 3);
        assert_eq!(registry.list_by_category(NodeCategory::Http).len(), 1);
    }
}
