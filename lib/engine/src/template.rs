//! Placeholder resolution for node configuration templates.
//!
//! Templates may contain `{{dotted.path}}` tokens that are replaced with the
//! stringified value found by walking the path through the execution context.
//!
//! A token whose path does not resolve is left **unreplaced**: the literal
//! `{{...}}` text remains in the output. This is the governing fail-soft
//! default for the whole engine. It keeps a missing context key from aborting
//! a notification or action, but it also silently hides missing data, so
//! downstream consumers that require a fully resolved value must check for
//! leftover `{{` markers themselves.

use crate::context::ExecutionContext;
use serde_json::Value as JsonValue;

/// Resolves `{{dotted.path}}` tokens in `template` against `context`.
#[must_use]
pub fn resolve(template: &str, context: &ExecutionContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                match context.get_path(path) {
                    Some(value) => output.push_str(&stringify(value)),
                    // Unresolved: keep the literal token text.
                    None => {
                        output.push_str("{{");
                        output.push_str(&after_open[..end]);
                        output.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            // Unterminated token: emit the remainder verbatim.
            None => {
                output.push_str(&rest[start..]);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Resolves templates embedded anywhere inside a JSON config value.
///
/// Strings are resolved with [`resolve`]; objects and arrays are walked
/// recursively; all other values pass through unchanged.
#[must_use]
pub fn resolve_value(value: &JsonValue, context: &ExecutionContext) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(resolve(s, context)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| resolve_value(v, context)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Stringifies a context value for interpolation.
///
/// Strings interpolate without surrounding quotes; everything else uses its
/// compact JSON form.
fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
