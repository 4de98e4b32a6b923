//! Minimal form schemas for manual entry and validation nodes.
//!
//! This is deliberately not JSON Schema: forms in the operations hub only
//! need required-field and primitive-type checks, so the schema model stays
//! small and serializable into the definition JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Primitive type expected for a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// A single field in a form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Field name (top-level key in the submitted object).
    pub name: String,
    /// Expected primitive type.
    pub field_type: FieldType,
    /// Whether the field must be present and non-null.
    #[serde(default)]
    pub required: bool,
}

impl FormField {
    /// Creates a required field.
    #[must_use]
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Creates an optional field.
    #[must_use]
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// A form schema: an ordered list of expected fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    /// Expected fields.
    pub fields: Vec<FormField>,
}

impl FormSchema {
    /// Creates a schema from a field list.
    #[must_use]
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    /// Validates submitted data against this schema.
    ///
    /// Returns the list of violations; empty means the data conforms.
    /// Unknown keys in the data are accepted.
    #[must_use]
    pub fn violations(&self, data: &JsonValue) -> Vec<String> {
        let Some(object) = data.as_object() else {
            return vec!["submitted data must be a JSON object".to_string()];
        };

        let mut violations = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(JsonValue::Null) => {
                    if field.required {
                        violations.push(format!("missing required field '{}'", field.name));
                    }
                }
                Some(value) => {
                    if !field.field_type.matches(value) {
                        violations.push(format!(
                            "field '{}' has wrong type (expected {:?})",
                            field.name, field.field_type
                        ));
                    }
                }
            }
        }
        violations
    }
}
