//! A tagged JSON-like value tree used for `Task::args` and `Task::metadata`.
//!
//! Kept distinct from `serde_json::Value` so the query matcher and dispatch
//! engine never depend on a specific serialization crate's dynamic type —
//! only the store boundary converts to/from `serde_json::Value`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Split `a.b.c` into `["a", "b", "c"]`. An empty path is invalid and
    /// returns an empty slice, which callers treat as "not present".
    fn split_path(path: &str) -> Vec<&str> {
        if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').collect()
        }
    }

    /// Traverse a dotted path. Missing intermediate keys (including
    /// indexing into a non-object) evaluate as "not present" rather than
    /// erroring, per the query matcher's missing-path semantics.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = Self::split_path(path);
        if segments.is_empty() {
            return None;
        }
        let mut current = self;
        for segment in segments {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn has_path(&self, path: &str) -> bool {
        matches!(self.get_path(path), Some(v) if !v.is_null())
    }

    /// Set a dotted path to `value`, creating intermediate objects as
    /// needed, without disturbing sibling keys. Returns an error if an
    /// intermediate segment already exists but isn't an object.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), SetPathError> {
        let segments = Self::split_path(path);
        let Some((last, init)) = segments.split_last() else {
            return Err(SetPathError::EmptyPath);
        };

        if !matches!(self, Value::Object(_)) {
            *self = Value::object();
        }

        let mut current = self;
        for segment in init {
            let map = match current {
                Value::Object(map) => map,
                _ => unreachable!("coerced to object above"),
            };
            let entry = map
                .entry((*segment).to_string())
                .or_insert_with(Value::object);
            if !matches!(entry, Value::Object(_)) {
                if matches!(entry, Value::Null) {
                    *entry = Value::object();
                } else {
                    return Err(SetPathError::NotAnObject((*segment).to_string()));
                }
            }
            current = entry;
        }

        match current {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                Ok(())
            }
            _ => unreachable!("coerced to object above"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SetPathError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path segment {0:?} exists and is not an object")]
    NotAnObject(String),
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::json!(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(a) => {
                serde_json::Value::Array(a.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(m) => serde_json::Value::Object(
                m.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}
