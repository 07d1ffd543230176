//! The dynamic value representation that flows between records, sections,
//! and the data-type bridge (C1). A [`Value`] is what a field holds once
//! materialized out of a record via `convert`/section extraction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A runtime value for a single field. `Default` values carry an opaque
/// JSON-like payload (nested records, maps, arrays) that the data-type
/// bridge wraps/unwraps with the `{ "value": v }` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    /// Any value that doesn't map onto one of the primitive variants above.
    Json(serde_json::Value),
}

impl Value {
    /// The dispatch rule of §4.1: classify a runtime value into the
    /// DataType variant that would have produced it, used when a query is
    /// built from a bare value rather than through a field descriptor.
    pub fn natural_kind(&self) -> &'static str {
        match self {
            Value::Null => "default",
            Value::Bool(_) => "boolean",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Json(_) => "default",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(n) => Some(*n as i64),
            Value::I64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(n) => Some(*n as f64),
            Value::F64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I32(n) => write!(f, "{n}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::F32(n) => write!(f, "{n}"),
            Value::F64(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

/// A key-to-value mapping belonging to the external configuration
/// component, used as the sole mechanism by which the library reads and
/// writes record state (§3, Record).
pub type RecordSection = BTreeMap<String, Value>;
