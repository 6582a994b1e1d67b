//! HTTP request node.
//!
//! Builds and sends a request from config and wired inputs. URL, headers,
//! and body strings are interpolated against run variables, so an earlier
//! variable node can feed a base URL or auth token into every request.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value, json};

use crate::{
    FlowError, Result,
    common::Vars,
    graph::{DataType, NodeInstance, Port},
    nodes::template,
    registry::{ExecutionOutput, NodeCategory, NodeExecutor, NodeMetadata, NodeTypeDefinition, NodeValidator},
    runtime::Context,
    validate::{ValidationIssue, ValidationState},
};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestNode {
    async fn run(
        &self,
        node: &NodeInstance,
        inputs: &Vars,
        ctx: Arc<Context>,
    ) -> Result<ExecutionOutput> {
        let fail = |cause: String| FlowError::Executor {
            node: node.id.clone(),
            cause,
        };

        let url = as_string(&template::render(inputs.get_value("url").unwrap_or(&Value::Null), &ctx));
        let method_key = node.config.get::<String>("method").unwrap_or_else(|| "GET".to_string());
        let method: reqwest::Method = method_key.to_uppercase().parse().map_err(|_| fail(format!("invalid method: {}", method_key)))?;

        let timeout_ms = node.config.get::<u64>("timeout_ms").unwrap_or(DEFAULT_TIMEOUT_MS);
        let mut request = self.client.request(method, &url).timeout(Duration::from_millis(timeout_ms));

        // config headers first, wired headers override
        let mut headers = Map::new();
        if let Some(Value::Object(configured)) = node.config.get_value("headers") {
            headers.extend(configured.clone());
        }
        if let Some(Value::Object(wired)) = inputs.get_value("headers") {
            headers.extend(wired.clone());
        }
        for (name, value) in &headers {
            request = request.header(name.as_str(), as_string(&template::render(value, &ctx)));
        }

        if let Some(Value::Object(query)) = node.config.get_value("query") {
            let pairs: Vec<(String, String)> = query.iter().map(|(k, v)| (k.clone(), as_string(&template::render(v, &ctx)))).collect();
            request = request.query(&pairs);
        }

        if let Some(Value::Object(auth)) = node.config.get_value("auth") {
            request = apply_auth(request, auth, &ctx).map_err(&fail)?;
        }

        let body = inputs.get_value("body").or_else(|| node.config.get_value("body")).cloned().unwrap_or(Value::Null);
        request = match template::render(&body, &ctx) {
            Value::Null => request,
            Value::String(text) => request.body(text),
            value => request.json(&value),
        };

        let response = request.send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_str().unwrap_or_default().to_string())))
            .collect();
        let text = response.text().await.map_err(|e| fail(e.to_string()))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if node.config.get::<bool>("fail_on_error").unwrap_or(false) && !status.is_success() {
            return Err(fail(format!("request to {} returned {}", url, status)));
        }

        let outputs = Vars::new()
            .with("response", json!({"status": status.as_u16(), "headers": response_headers, "body": body}))
            .with("status", status.as_u16())
            .with("headers", Value::Object(response_headers.clone()))
            .with("body", body);
        Ok(ExecutionOutput::success(outputs))
    }
}

fn as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_auth(
    request: reqwest::RequestBuilder,
    auth: &Map<String, Value>,
    ctx: &Context,
) -> std::result::Result<reqwest::RequestBuilder, String> {
    let render = |key: &str| auth.get(key).map(|v| as_string(&template::render(v, ctx))).unwrap_or_default();

    match auth.get("type").and_then(|v| v.as_str()) {
        Some("none") => Ok(request),
        Some("basic") => {
            let credentials = BASE64.encode(format!("{}:{}", render("username"), render("password")));
            Ok(request.header(reqwest::header::AUTHORIZATION, format!("Basic {}", credentials)))
        }
        Some("bearer") => Ok(request.bearer_auth(render("token"))),
        Some("api_key") => {
            let header = auth.get("api_key_header").and_then(|v| v.as_str()).unwrap_or("X-API-Key").to_string();
            Ok(request.header(header, render("api_key")))
        }
        Some(other) => Err(format!("unknown auth type: {}", other)),
        None => Err("auth requires a type".to_string()),
    }
}

/// JSON Schema for the node's static config; checked by the validation
/// engine, not at run time.
fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "method": {"type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS",
                                                  "get", "post", "put", "patch", "delete", "head", "options"]},
            "url": {"type": "string", "minLength": 1},
            "headers": {"type": "object"},
            "query": {"type": "object"},
            "timeout_ms": {"type": "integer", "minimum": 0},
            "fail_on_error": {"type": "boolean"},
            "auth": {
                "type": "object",
                "properties": {"type": {"enum": ["none", "basic", "bearer", "api_key"]}},
                "required": ["type"]
            }
        }
    })
}

fn config_validator() -> NodeValidator {
    let compiled = jsonschema::validator_for(&config_schema()).ok();
    Arc::new(move |config: &Vars| {
        let Some(compiled) = &compiled else {
            return ValidationState::valid();
        };
        let value: Value = config.clone().into();
        let errors: Vec<ValidationIssue> = compiled.iter_errors(&value).map(|e| ValidationIssue::new(&e.instance_path().to_string(), &e.to_string())).collect();
        ValidationState::from_errors(errors)
    })
}

pub fn definition() -> NodeTypeDefinition {
    NodeTypeDefinition {
        type_key: "http_request".to_string(),
        metadata: NodeMetadata::new("HTTP Request", "Sends an HTTP request and emits the response", NodeCategory::Http, "#2c3e50"),
        default_config: Vars::new().with("method", "GET").with("timeout_ms", DEFAULT_TIMEOUT_MS),
        inputs: vec![
            Port::new("url", DataType::String, true),
            Port::new("body", DataType::Any, false),
            Port::new("headers", DataType::Object, false),
        ],
        outputs: vec![
            Port::new("response", DataType::HttpResponse, false),
            Port::new("status", DataType::Number, false),
            Port::new("headers", DataType::Object, false),
            Port::new("body", DataType::Any, false),
        ],
        executor: Arc::new(HttpRequestNode::new()),
        validator: Some(config_validator()),
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

    fn auth_map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_auth_header_shapes() {
        let ctx = context();
        let client = reqwest::Client::new();
        let base = || client.get("http://localhost/ping");

        let request = apply_auth(base(), &auth_map(json!({"type": "none"})), &ctx).unwrap().build().unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());

        let request = apply_auth(base(), &auth_map(json!({"type": "bearer", "token": "t0"})), &ctx).unwrap().build().unwrap();
        assert_eq!(request.headers().get(reqwest::header::AUTHORIZATION).unwrap(), "Bearer t0");

        let request = apply_auth(base(), &auth_map(json!({"type": "api_key", "api_key": "k123"})), &ctx).unwrap().build().unwrap();
        assert_eq!(request.headers().get("X-API-Key").unwrap(), "k123");

        let request = apply_auth(base(), &auth_map(json!({"type": "api_key", "api_key": "k123", "api_key_header": "X-Custom-Key"})), &ctx).unwrap().build().unwrap();
        assert_eq!(request.headers().get("X-Custom-Key").unwrap(), "k123");

        assert!(apply_auth(base(), &auth_map(json!({"type": "voodoo"})), &ctx).is_err());
    }

    #[test]
    fn test_validator_accepts_default_config() {
        let state = config_validator()(&definition().default_config);
        assert!(state.is_valid);
    }

    #[test]
    fn test_validator_rejects_bad_config() {
        let validator = config_validator();

        let state = validator(&Vars::new().with("method", "TELEPORT"));
        assert!(!state.is_valid);

        let state = validator(&Vars::new().with("timeout_ms", -5));
        assert!(!state.is_valid);

        let state = validator(&Vars::new().with("auth", serde_json::json!({"username": "u"})));
        assert!(!state.is_valid);
    }

    #[test]
    fn test_validator_flags_the_offending_field() {
        let state = config_validator()(&Vars::new().with("url", ""));
        assert!(!state.is_valid);
        assert!(state.errors[0].field.contains("url"));
    }

    #[test]
    fn test_as_string_keeps_strings_bare() {
        assert_eq!(as_string(&serde_json::json!("plain")), "plain");
        assert_eq!(as_string(&serde_json::json!(7)), "7");
    }
}
