//! Condition node: evaluates a comparison and routes the value down exactly
//! one of two branches.
//!
//! The `result` port always emits the boolean outcome. Exactly one of the
//! `true`/`false` ports emits; the other stays silent, so the unselected
//! branch is pruned by the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    FlowError, Result,
    common::Vars,
    graph::{DataType, NodeInstance, Port},
    nodes::template,
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition},
    runtime::Context,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    Exists,
    Matches,
}

pub struct ConditionNode;

#[async_trait]
impl NodeExecutor for ConditionNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let value = template::render(inputs.get_value("value").unwrap_or(&Value::Null), &ctx);
        let compare = template::render(inputs.get_value("compare").or_else(|| node.config.get_value("compare")).unwrap_or(&Value::Null), &ctx);

        let operator_key = node.config.get::<String>("operator").unwrap_or_else(|| "equals".to_string());
        let operator: Operator = operator_key.parse().map_err(|_| FlowError::Executor {
            node: node.id.clone(),
            cause: format!("unknown operator: {}", operator_key),
        })?;

        let result = evaluate(operator, &value, &compare).map_err(|cause| FlowError::Executor {
            node: node.id.clone(),
            cause,
        })?;

        // the routed value defaults to the input itself
        let mut outputs = Vars::new().with("result", result);
        if result {
            let routed = inputs.get_value("true_value").or_else(|| node.config.get_value("true_value")).cloned().unwrap_or(value);
            outputs.insert("true".to_string(), routed);
        } else {
            let routed = inputs.get_value("false_value").or_else(|| node.config.get_value("false_value")).cloned().unwrap_or(value);
            outputs.insert("false".to_string(), routed);
        }

        Ok(ExecutionOutput::success(outputs))
    }
}

fn evaluate(
    operator: Operator,
    value: &Value,
    compare: &Value,
) -> std::result::Result<bool, String> {
    match operator {
        Operator::Equals => Ok(value == compare),
        Operator::NotEquals => Ok(value != compare),
        Operator::GreaterThan => numeric(value, compare).map(|(a, b)| a > b),
        Operator::LessThan => numeric(value, compare).map(|(a, b)| a < b),
        Operator::GreaterEqual => numeric(value, compare).map(|(a, b)| a >= b),
        Operator::LessEqual => numeric(value, compare).map(|(a, b)| a <= b),
        Operator::Contains => contains(value, compare),
        Operator::Exists => Ok(!value.is_null()),
        Operator::Matches => {
            let haystack = value.as_str().ok_or_else(|| "matches requires a string value".to_string())?;
            let pattern = compare.as_str().ok_or_else(|| "matches requires a string pattern".to_string())?;
            let regex = regex::Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
            Ok(regex.is_match(haystack))
        }
    }
}

fn numeric(
    value: &Value,
    compare: &Value,
) -> std::result::Result<(f64, f64), String> {
    match (value.as_f64(), compare.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err("numeric comparison requires numbers".to_string()),
    }
}

fn contains(
    value: &Value,
    compare: &Value,
) -> std::result::Result<bool, String> {
    match value {
        Value::String(s) => compare.as_str().map(|needle| s.contains(needle)).ok_or_else(|| "contains on a string requires a string".to_string()),
        Value::Array(items) => Ok(items.contains(compare)),
        Value::Object(map) => compare.as_str().map(|key| map.contains_key(key)).ok_or_else(|| "contains on an object requires a string key".to_string()),
        _ => Err("contains requires a string, array, or object".to_string()),
    }
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "condition".to_string(),
        metadata: NodeMetadata::new("Condition", "Evaluates a comparison and routes the value to one branch", NodeCategory::ControlFlow, "#e67e22"),
        default_config: Vars::new().with("operator", "equals"),
        inputs: vec![
            Port::new("value", DataType::Any, true),
            Port::new("compare", DataType::Any, false),
            Port::new("true_value", DataType::Any, false),
            Port::new("false_value", DataType::Any, false),
        ],
        outputs: vec![
            Port::new("result", DataType::Boolean, false),
            Port::new("true", DataType::Any, false),
            Port::new("false", DataType::Any, false),
        ],
        executor: Arc::new(ConditionNode),
        validator: None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{nodes, runtime::Channel, utils};

    fn context() -> Arc<Context> {
        let registry = Arc::new(nodes::builtin_registry());
        let channel = Arc::new(Channel::new(tokio::runtime::Handle::current()));
        Arc::new(Context::new("wf-test", utils::longid(), registry, channel))
    }

    async fn run(
        config: Vars,
        inputs: Vars,
    ) -> ExecutionOutput {
        let mut node = definition().instantiate(Default::default());
        node.config = config;
        ConditionNode.run(&node, &inputs, context()).await.unwrap()
    }

    #[tokio::test]
    async fn test_true_branch_emits_false_stays_silent() {
        let output = run(
            Vars::new().with("operator", "greater_than").with("compare", 5),
            Vars::new().with("value", 10),
        )
        .await;

        assert_eq!(output.outputs.get::<bool>("result"), Some(true));
        assert_eq!(output.outputs.get_value("true"), Some(&json!(10)));
        assert!(output.outputs.get_value("false").is_none());
    }

    #[tokio::test]
    async fn test_false_branch_emits_true_stays_silent() {
        let output = run(
            Vars::new().with("operator", "equals").with("compare", "a"),
            Vars::new().with("value", "b"),
        )
        .await;

        assert_eq!(output.outputs.get::<bool>("result"), Some(false));
        assert!(output.outputs.get_value("true").is_none());
        assert_eq!(output.outputs.get_value("false"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn test_routed_value_overrides() {
        let output = run(
            Vars::new().with("operator", "exists").with("true_value", "yes"),
            Vars::new().with("value", 1),
        )
        .await;
        assert_eq!(output.outputs.get_value("true"), Some(&json!("yes")));
    }

    #[tokio::test]
    async fn test_operators() {
        assert_eq!(evaluate(Operator::Contains, &json!([1, 2]), &json!(2)), Ok(true));
        assert_eq!(evaluate(Operator::Contains, &json!("hello"), &json!("ell")), Ok(true));
        assert_eq!(evaluate(Operator::Contains, &json!({"k": 1}), &json!("k")), Ok(true));
        assert_eq!(evaluate(Operator::Matches, &json!("abc123"), &json!(r"\d+")), Ok(true));
        assert_eq!(evaluate(Operator::Exists, &Value::Null, &Value::Null), Ok(false));
        assert!(evaluate(Operator::GreaterThan, &json!("x"), &json!(1)).is_err());
    }

    #[tokio::test]
    async fn test_unknown_operator_fails() {
        let mut node = definition().instantiate(Default::default());
        node.config = Vars::new().with("operator", "sideways");
        let err = ConditionNode.run(&node, &Vars::new().with("value", 1), context()).await.unwrap_err();
        assert!(matches!(err, FlowError::Executor { .. }));
    }
}
