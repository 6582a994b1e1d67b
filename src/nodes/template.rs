//! `{{variable}}` interpolation against run variables.
//!
//! Config strings may reference run variables with `{{name}}` placeholders,
//! including dotted paths into object values (`{{user.name}}`). A string
//! that is exactly one placeholder resolves to the raw JSON value and keeps
//! its type; mixed text renders each placeholder in string form. Unknown
//! variables are left in place.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::runtime::Context;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").unwrap());

/// Renders every string inside a JSON value, recursing through objects and
/// arrays.
pub fn render(
    value: &Value,
    ctx: &Context,
) -> Value {
    match value {
        Value::String(s) => render_str(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, ctx)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), render(v, ctx))).collect()),
        other => other.clone(),
    }
}

/// Renders placeholders in one string.
pub fn render_str(
    input: &str,
    ctx: &Context,
) -> Value {
    let trimmed = input.trim();
    if let Some(found) = PLACEHOLDER.find(trimmed)
        && found.start() == 0
        && found.end() == trimmed.len()
        && let Some(captures) = PLACEHOLDER.captures(trimmed)
        && let Some(value) = lookup(ctx, &captures[1])
    {
        return value;
    }

    let rendered = PLACEHOLDER.replace_all(input, |captures: &regex::Captures| match lookup(ctx, &captures[1]) {
        Some(Value::String(s)) => s,
        Some(value) => value.to_string(),
        None => captures[0].to_string(),
    });
    Value::String(rendered.into_owned())
}

/// Resolves a variable reference, trying the literal name first and dotted
/// path traversal second.
fn lookup(
    ctx: &Context,
    path: &str,
) -> Option<Value> {
    if let Some(value) = ctx.get_variable(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once('.')?;
    let mut current = ctx.get_variable(head)?;
    for segment in rest.split('.') {
        current = current.get(segment)?.clone();
    }
    Some(current)
}
