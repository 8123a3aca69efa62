//! Execution state threaded through a graph run.
//!
//! A [`State`] is an insertion-ordered key/value map. Well-known fields are
//! read and written through typed accessors (`get_as` / `insert_as`) so the
//! shape expected by a node is checked at the boundary, while anything
//! truly dynamic stays available as raw JSON values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Insertion-ordered key/value map owned by exactly one run or actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    values: Map<String, Value>,
}

impl State {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnObject`] for any non-object value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::new()),
            other => Err(Error::NotAnObject {
                reason: format!("expected object, got {}", type_name(&other)),
            }),
        }
    }

    /// Convert into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a field decoded into a concrete type.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateType`] when the field exists but does not
    /// decode as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.values
            .get(key)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| Error::state_type(key, std::any::type_name::<T>(), e.to_string()))
            })
            .transpose()
    }

    /// Insert a raw value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Insert a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateType`] if `value` cannot be represented as JSON.
    pub fn insert_as<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let encoded = serde_json::to_value(value)
            .map_err(|e| Error::state_type(&key, std::any::type_name::<T>(), e.to_string()))?;
        self.values.insert(key, encoded);
        Ok(())
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Check whether a field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether a field holds a "truthy" value.
    ///
    /// Absent, `null`, `false`, `0`, empty strings, empty arrays and empty
    /// objects are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        })
    }

    /// Merge another state into this one; keys in `other` win.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.values {
            self.values.insert(key, value);
        }
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the state has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for State {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
