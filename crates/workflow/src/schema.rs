//! Advisory state schema.
//!
//! A schema maps field names to declared type names. It is metadata for
//! tooling (validation, visualization) and is never consulted by the engine
//! while a graph executes.

use std::collections::BTreeMap;
use std::fmt;

use braid_core::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a state field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
    /// A type name tooling understands but this crate does not.
    Other(String),
}

impl FieldType {
    /// Whether `value` conforms to this declared type.
    ///
    /// `Any` and unrecognized names accept everything.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any | Self::Other(_) => true,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "string" | "str" => Self::String,
            "number" | "float" => Self::Number,
            "integer" | "int" => Self::Integer,
            "boolean" | "bool" => Self::Boolean,
            "array" | "list" => Self::Array,
            "object" | "map" => Self::Object,
            "any" => Self::Any,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mismatch between a state and its declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// A declared field is not present.
    Missing { field: String },
    /// A declared field holds a value of another type.
    WrongType { field: String, expected: FieldType },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => write!(f, "field '{field}' is missing"),
            Self::WrongType { field, expected } => {
                write!(f, "field '{field}' is not of type {expected}")
            }
        }
    }
}

/// Field name to declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldType>,
}

impl StateSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        self.fields.insert(name.into(), ty.into());
        self
    }

    /// Declared type of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    /// Iterate declared fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldType)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Report every way `state` deviates from this schema.
    ///
    /// Fields not declared in the schema are ignored.
    #[must_use]
    pub fn validate(&self, state: &State) -> Vec<SchemaViolation> {
        self.fields
            .iter()
            .filter_map(|(field, expected)| match state.get(field) {
                None => Some(SchemaViolation::Missing {
                    field: field.clone(),
                }),
                Some(value) if !expected.accepts(value) => Some(SchemaViolation::WrongType {
                    field: field.clone(),
                    expected: expected.clone(),
                }),
                Some(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_reports_missing_and_mistyped() {
        let schema = StateSchema::new()
            .field("count", "integer")
            .field("label", "string")
            .field("tags", "array");

        let state = State::new().with("count", "three").with("tags", json!([]));
        let violations = schema.validate(&state);

        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&SchemaViolation::WrongType {
            field: "count".into(),
            expected: FieldType::Integer,
        }));
        assert!(violations.contains(&SchemaViolation::Missing {
            field: "label".into()
        }));
    }

    #[test]
    fn test_unknown_type_names_accept_anything() {
        let schema = StateSchema::new().field("blob", "embedding");
        let state = State::new().with("blob", json!({"dims": 3}));
        assert!(schema.validate(&state).is_empty());
        assert_eq!(
            schema.get("blob"),
            Some(&FieldType::Other("embedding".into()))
        );
    }

    #[test]
    fn test_schema_serde_uses_type_names() {
        let schema: StateSchema =
            serde_json::from_value(json!({"n": "int", "ok": "bool"})).unwrap();
        assert_eq!(schema.get("n"), Some(&FieldType::Integer));

        let back = serde_json::to_value(&schema).unwrap();
        assert_eq!(back, json!({"n": "integer", "ok": "boolean"}));
    }
}
