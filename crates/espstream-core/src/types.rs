//! Schema field types and decoded field values.
//!
//! The server announces each subscription's fields with its own type
//! names (`int64`, `money`, `array(dbl)`, ...). ESPStream folds them into
//! the closed [`SchemaFieldType`] set, and every decoded value is a
//! [`FieldValue`] regardless of which wire encoding carried it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::wire::WireValue;

/// The closed set of semantic field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFieldType {
    Array,
    Blob,
    Double,
    Int,
    Timestamp,
    String,
    Date,
}

/// Server type name → semantic type. Keys are lowercase.
pub const TYPE_TABLE: &[(&str, SchemaFieldType)] = &[
    ("array(dbl)", SchemaFieldType::Array),
    ("array(i32)", SchemaFieldType::Array),
    ("array(i64)", SchemaFieldType::Array),
    ("blob", SchemaFieldType::Blob),
    ("date", SchemaFieldType::Date),
    ("double", SchemaFieldType::Double),
    ("int32", SchemaFieldType::Int),
    ("int64", SchemaFieldType::Int),
    ("money", SchemaFieldType::Double),
    ("rstring", SchemaFieldType::String),
    ("stamp", SchemaFieldType::Timestamp),
    ("string", SchemaFieldType::String),
];

impl SchemaFieldType {
    /// Case-insensitive lookup of a server type name.
    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        let lower = name.to_lowercase();
        TYPE_TABLE
            .iter()
            .find(|(key, _)| *key == lower)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| DecodeError::UnknownFieldType {
                name: name.to_string(),
            })
    }
}

impl FromStr for SchemaFieldType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaFieldType::Array => "array",
            SchemaFieldType::Blob => "blob",
            SchemaFieldType::Double => "double",
            SchemaFieldType::Int => "int",
            SchemaFieldType::Timestamp => "timestamp",
            SchemaFieldType::String => "string",
            SchemaFieldType::Date => "date",
        };
        write!(f, "{s}")
    }
}

/// Returns `true` for reserved names (`@timestamp`, `@opcode`, `@key`, ...)
/// that never become fields of a [`crate::event::WindowEvent`].
pub fn is_internal_field_name(name: &str) -> bool {
    name.starts_with('@')
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Int(i64),
    /// Unsigned integers that do not fit in `i64`
    Uint(u64),
    Double(f64),
    Str(String),
    Bool(bool),
    /// Absolute time, microsecond resolution
    Timestamp(DateTime<Utc>),
    /// Calendar date, second resolution
    Date(DateTime<Utc>),
    /// Opaque bytes in standard base64 text form
    Blob(String),
    /// Serialized array; NaN and null elements are explicit `null`s
    Array(serde_json::Value),
    /// Anything else, kept as received
    Raw(WireValue),
}

impl FieldValue {
    /// Returns the integer value if this is an `Int` or a `Uint`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            FieldValue::Int(v) => Some(i128::from(*v)),
            FieldValue::Uint(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) | FieldValue::Blob(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Scalars pass through unchanged; integers are normalized so that the
/// same logical number compares equal whichever encoding carried it.
impl From<WireValue> for FieldValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Unsigned(v) => match i64::try_from(v) {
                Ok(signed) => FieldValue::Int(signed),
                Err(_) => FieldValue::Uint(v),
            },
            WireValue::Signed(v) => FieldValue::Int(v),
            WireValue::Float(v) => FieldValue::Double(v),
            WireValue::Text(s) => FieldValue::Str(s),
            WireValue::Bool(b) => FieldValue::Bool(b),
            other => FieldValue::Raw(other),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            FieldValue::Date(t) => write!(f, "{}", t.to_rfc3339()),
            FieldValue::Blob(b) => write!(f, "{b}"),
            FieldValue::Array(v) => write!(f, "{v}"),
            FieldValue::Raw(v) => write!(f, "{v:?}"),
        }
    }
}

/// One named value of a decoded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field{{name={}, value={}}}", self.name, self.value)
    }
}
