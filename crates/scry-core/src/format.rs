//! Result rendering.
//!
//! `format_value` is total: every value renders to a string, and
//! recursion is bounded so arbitrarily deep structures cannot overflow
//! the stack. Purely presentational - a rendering problem becomes text,
//! never an error that could reach the session loop.

use serde_json::Value;

/// Nesting depth rendered before eliding the remainder with `...`.
pub const MAX_RENDER_DEPTH: usize = 16;

/// Placeholder rendered for absent values and JSON null.
pub const NULL_PLACEHOLDER: &str = "null";

/// Render an evaluation result for the transcript.
///
/// - Absent values and null render as [`NULL_PLACEHOLDER`].
/// - Top-level strings pass through verbatim, unquoted.
/// - Everything else renders deterministically: arrays as `[a, b]`,
///   objects as `{key: value}` in map order, nested strings quoted.
pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NULL_PLACEHOLDER.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => render(other, 0),
    }
}

fn render(value: &Value, depth: usize) -> String {
    if depth >= MAX_RENDER_DEPTH {
        return "...".to_string();
    }

    match value {
        Value::Null => NULL_PLACEHOLDER.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(|v| render(v, depth + 1)).collect();
            format!("[{}]", inner.join(", "))
        },
        Value::Object(map) => {
            let inner: Vec<String> =
                map.iter().map(|(k, v)| format!("{k}: {}", render(v, depth + 1))).collect();
            format!("{{{}}}", inner.join(", "))
        },
    }
}
