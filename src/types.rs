//! The data-type bridge (C1): the cross-backend mapping between a
//! declared [`DataType`] and each backend's wire representation.
//!
//! Every operation here is total for well-typed input; the only failure
//! modes are [`Error::TypeMismatch`] (value doesn't match its declared
//! type) and [`Error::DecodeError`] (the default variant's JSON envelope
//! is missing or malformed).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::Size;
use crate::value::Value;

/// The three supported storage engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Sqlite,
    Mysql,
    Mongo,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Mysql => "mysql",
            Backend::Mongo => "mongo",
        }
    }
}

/// The closed set of field types this crate understands, per §3/§4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    I32,
    I64,
    F32,
    F64,
    String,
    /// Any other value, including nested records and maps; JSON-wrapped.
    Default,
}

/// The backend-agnostic wire representation a value is converted to/from
/// before a backend driver binds or decodes it. Relational drivers bind
/// these directly as statement parameters; the document driver converts
/// them once more into `bson::Bson` (a direct, lossless mapping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Wire {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

/// The JSON envelope the `Default` variant uses on the wire, per §6.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: serde_json::Value,
}

impl DataType {
    /// Classifies a runtime value into the DataType variant that would have
    /// produced it (§4.1, "Dispatch of declared type").
    pub fn of(value: &Value) -> DataType {
        match value {
            Value::Bool(_) => DataType::Boolean,
            Value::I32(_) => DataType::I32,
            Value::I64(_) => DataType::I64,
            Value::F32(_) => DataType::F32,
            Value::F64(_) => DataType::F64,
            Value::String(_) => DataType::String,
            Value::Null | Value::Json(_) => DataType::Default,
        }
    }

    /// Per-backend column/field type name, per the §4.1 table.
    pub fn type_name(&self, backend: Backend, max_size: Size) -> String {
        match (self, backend) {
            (DataType::Boolean, Backend::Sqlite) => "INTEGER".to_string(),
            (DataType::Boolean, Backend::Mysql) => "TINYINT(2)".to_string(),
            (DataType::Boolean, Backend::Mongo) => "boolean".to_string(),

            (DataType::I32, Backend::Sqlite) => "INTEGER".to_string(),
            (DataType::I32, Backend::Mysql) => "INT".to_string(),
            (DataType::I32, Backend::Mongo) => "int".to_string(),

            (DataType::I64, Backend::Sqlite) => "INTEGER".to_string(),
            (DataType::I64, Backend::Mysql) => match max_size {
                Size::Bounded(n) if n <= 64 => "BIT(64)".to_string(),
                Size::Bounded(n) if n <= 32767 => "SMALLINT(255)".to_string(),
                _ => "BIGINT(255)".to_string(),
            },
            (DataType::I64, Backend::Mongo) => "long".to_string(),

            (DataType::F32, Backend::Sqlite) => "REAL".to_string(),
            (DataType::F32, Backend::Mysql) => "DECIMAL(65)".to_string(),
            (DataType::F32, Backend::Mongo) => "double".to_string(),

            (DataType::F64, Backend::Sqlite) => "REAL".to_string(),
            (DataType::F64, Backend::Mysql) => "DECIMAL(65)".to_string(),
            (DataType::F64, Backend::Mongo) => "double".to_string(),

            (DataType::String, Backend::Sqlite) => "TEXT".to_string(),
            (DataType::String, Backend::Mysql) => match max_size {
                Size::Bounded(n) if n <= 255 => "CHAR(255)".to_string(),
                Size::Bounded(n) if n <= 65535 => format!("VARCHAR({n})"),
                _ => "LONGTEXT".to_string(),
            },
            (DataType::String, Backend::Mongo) => "string".to_string(),

            (DataType::Default, Backend::Sqlite) => "TEXT".to_string(),
            (DataType::Default, Backend::Mysql) => "LONGTEXT".to_string(),
            (DataType::Default, Backend::Mongo) => "document".to_string(),
        }
    }

    /// Converts a declared-type value into its wire representation for
    /// `backend`. Fails with `TypeMismatch` unless the value's runtime type
    /// agrees with `self` (widening among integer widths is allowed).
    pub fn value_to_wire(&self, field: &str, value: &Value, backend: Backend) -> Result<Wire> {
        match self {
            DataType::Boolean => {
                let b = value.as_bool().ok_or_else(|| {
                    Error::type_mismatch("bind", field, "boolean", value.natural_kind())
                })?;
                match backend {
                    Backend::Mongo => Ok(Wire::Bool(b)),
                    Backend::Sqlite | Backend::Mysql => Ok(Wire::I64(if b { 1 } else { 0 })),
                }
            }
            DataType::I32 | DataType::I64 => {
                let n = value.as_i64().ok_or_else(|| {
                    Error::type_mismatch("bind", field, "integer", value.natural_kind())
                })?;
                Ok(Wire::I64(n))
            }
            DataType::F32 | DataType::F64 => {
                let n = value.as_f64().ok_or_else(|| {
                    Error::type_mismatch("bind", field, "float", value.natural_kind())
                })?;
                Ok(Wire::F64(n))
            }
            DataType::String => {
                let s = value.as_str().ok_or_else(|| {
                    Error::type_mismatch("bind", field, "string", value.natural_kind())
                })?;
                Ok(Wire::Text(s.to_string()))
            }
            DataType::Default => {
                let json = match value {
                    Value::Json(v) => v.clone(),
                    Value::Null => serde_json::Value::Null,
                    other => serde_json::to_value(other)
                        .map_err(|e| Error::decode("bind", e.to_string()))?,
                };
                let envelope = Envelope { value: json };
                let text = serde_json::to_string(&envelope)
                    .map_err(|e| Error::decode("bind", e.to_string()))?;
                Ok(Wire::Text(text))
            }
        }
    }

    /// Converts a wire value read back from `backend` into a declared-type
    /// value. Fails with `DecodeError` if the default variant's envelope is
    /// missing or malformed (no silent best-effort fallback, per §9).
    pub fn wire_to_value(&self, field: &str, wire: Wire, backend: Backend) -> Result<Value> {
        match self {
            DataType::Boolean => match (backend, wire) {
                (Backend::Mongo, Wire::Bool(b)) => Ok(Value::Bool(b)),
                (Backend::Sqlite | Backend::Mysql, Wire::I64(n)) => Ok(Value::Bool(n == 1)),
                (_, other) => Err(Error::decode(
                    "read",
                    format!("field '{field}' has unexpected wire shape {other:?}"),
                )),
            },
            DataType::I32 => match wire {
                Wire::I64(n) => Ok(Value::I32(n as i32)),
                other => Err(Error::decode("read", format!("field '{field}' wasn't an integer: {other:?}"))),
            },
            DataType::I64 => match wire {
                Wire::I64(n) => Ok(Value::I64(n)),
                other => Err(Error::decode("read", format!("field '{field}' wasn't an integer: {other:?}"))),
            },
            DataType::F32 => match wire {
                Wire::F64(n) => Ok(Value::F32(n as f32)),
                other => Err(Error::decode("read", format!("field '{field}' wasn't a float: {other:?}"))),
            },
            DataType::F64 => match wire {
                Wire::F64(n) => Ok(Value::F64(n)),
                other => Err(Error::decode("read", format!("field '{field}' wasn't a float: {other:?}"))),
            },
            DataType::String => match wire {
                Wire::Text(s) => Ok(Value::String(s)),
                other => Err(Error::decode("read", format!("field '{field}' wasn't a string: {other:?}"))),
            },
            DataType::Default => match wire {
                Wire::Text(text) => {
                    let envelope: Envelope = serde_json::from_str(&text).map_err(|_| {
                        Error::decode(
                            "read",
                            format!("field '{field}' is not a valid {{\"value\": ...}} envelope"),
                        )
                    })?;
                    Ok(Value::Json(envelope.value))
                }
                other => Err(Error::decode(
                    "read",
                    format!("field '{field}' default-variant wire shape unsupported: {other:?}"),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_maps_to_integer_on_relational_backends() {
        let dt = DataType::Boolean;
        assert_eq!(
            dt.value_to_wire("b", &Value::Bool(true), Backend::Sqlite).unwrap(),
            Wire::I64(1)
        );
        assert_eq!(
            dt.value_to_wire("b", &Value::Bool(false), Backend::Mysql).unwrap(),
            Wire::I64(0)
        );
        assert_eq!(
            dt.value_to_wire("b", &Value::Bool(true), Backend::Mongo).unwrap(),
            Wire::Bool(true)
        );
    }

    #[test]
    fn boolean_roundtrips() {
        let dt = DataType::Boolean;
        let wire = dt.value_to_wire("b", &Value::Bool(true), Backend::Sqlite).unwrap();
        assert_eq!(dt.wire_to_value("b", wire, Backend::Sqlite).unwrap(), Value::Bool(true));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let dt = DataType::Boolean;
        let err = dt.value_to_wire("b", &Value::String("x".into()), Backend::Sqlite);
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn default_variant_wraps_and_unwraps() {
        let dt = DataType::Default;
        let value = Value::Json(serde_json::json!({"nested": [1, 2, 3]}));
        let wire = dt.value_to_wire("payload", &value, Backend::Sqlite).unwrap();
        match &wire {
            Wire::Text(t) => assert!(t.starts_with("{\"value\":")),
            _ => panic!("expected text wire"),
        }
        let roundtripped = dt.wire_to_value("payload", wire, Backend::Sqlite).unwrap();
        assert_eq!(roundtripped, value);
    }

    #[test]
    fn default_variant_rejects_unwrapped_text() {
        let dt = DataType::Default;
        let err = dt.wire_to_value("payload", Wire::Text("{\"nested\":1}".into()), Backend::Sqlite);
        assert!(matches!(err, Err(Error::DecodeError { .. })));
    }

    #[test]
    fn mysql_type_names_follow_size_table() {
        assert_eq!(DataType::I64.type_name(Backend::Mysql, Size::Bounded(64)), "BIT(64)");
        assert_eq!(DataType::I64.type_name(Backend::Mysql, Size::Bounded(1000)), "SMALLINT(255)");
        assert_eq!(DataType::I64.type_name(Backend::Mysql, Size::Unbounded), "BIGINT(255)");
        assert_eq!(DataType::String.type_name(Backend::Mysql, Size::Bounded(10)), "CHAR(255)");
        assert_eq!(DataType::String.type_name(Backend::Mysql, Size::Bounded(1000)), "VARCHAR(1000)");
        assert_eq!(DataType::String.type_name(Backend::Mysql, Size::Unbounded), "LONGTEXT");
    }
}
