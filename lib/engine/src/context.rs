//! Execution context for workflow instances.
//!
//! The context is the accumulating key/value state threaded through an
//! instance's execution. Context updates are additive: a node may add or
//! overwrite keys, but prior keys are never silently dropped. Every merge
//! produces a fresh snapshot so execution-log entries can record the exact
//! state a node observed, independent of later transitions.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// An immutable-by-convention context snapshot.
///
/// Mutating operations return a new snapshot rather than editing in place,
/// which keeps execution-log entries stable for audit and replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(BTreeMap<String, JsonValue>);

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a context from a JSON object.
    ///
    /// Non-object values produce an empty context.
    #[must_use]
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self(map.into_iter().collect()),
            _ => Self::new(),
        }
    }

    /// Returns the value stored under a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Resolves a dotted path (e.g. `customer.contact.email`) through the
    /// context.
    ///
    /// Returns `None` if any step of the path is absent or the intermediate
    /// value is not an object.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns a new snapshot with the entries of `updates` merged in.
    ///
    /// Keys present in `updates` overwrite existing keys; all other keys are
    /// carried over unchanged.
    #[must_use]
    pub fn merged(&self, updates: &JsonValue) -> Self {
        let mut map = self.0.clone();
        if let JsonValue::Object(entries) = updates {
            for (key, value) in entries {
                map.insert(key.clone(), value.clone());
            }
        }
        Self(map)
    }

    /// Returns a new snapshot with a single key set.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: JsonValue) -> Self {
        let mut map = self.0.clone();
        map.insert(key.into(), value);
        Self(map)
    }

    /// Returns the context as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Returns the number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the context has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_resolution_walks_nested_objects() {
        let ctx = ExecutionContext::from_value(json!({
            "customer": { "contact": { "email": "ops@acme.test" } }
        }));

        assert_eq!(
            ctx.get_path("customer.contact.email"),
            Some(&json!("ops@acme.test"))
        );
    }

    #[test]
    fn path_resolution_missing_step_is_none() {
        let ctx = ExecutionContext::from_value(json!({ "customer": { "name": "Acme" } }));

        assert_eq!(ctx.get_path("customer.phone"), None);
        assert_eq!(ctx.get_path("shipment.id"), None);
    }

    #[test]
    fn path_through_non_object_is_none() {
        let ctx = ExecutionContext::from_value(json!({ "count": 3 }));
        assert_eq!(ctx.get_path("count.inner"), None);
    }

    #[test]
    fn merge_is_additive_and_overwriting() {
        let ctx = ExecutionContext::from_value(json!({ "a": 1, "b": 2 }));
        let merged = ctx.merged(&json!({ "b": 3, "c": 4 }));

        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(3)));
        assert_eq!(merged.get("c"), Some(&json!(4)));
        // Original snapshot is untouched.
        assert_eq!(ctx.get("b"), Some(&json!(2)));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn merge_ignores_non_object_updates() {
        let ctx = ExecutionContext::from_value(json!({ "a": 1 }));
        let merged = ctx.merged(&json!("not an object"));
        assert_eq!(merged, ctx);
    }

    #[test]
    fn context_serde_roundtrip() {
        let ctx = ExecutionContext::from_value(json!({ "shipment": { "mode": "sea" } }));
        let json = serde_json::to_string(&ctx).expect("serialize");
        let parsed: ExecutionContext = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(ctx, parsed);
    }
}
