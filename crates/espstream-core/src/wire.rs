//! Codec-neutral representation of values as the server sent them.
//!
//! The compact (CBOR) and JSON envelopes both deserialize into
//! [`WireValue`], so the decoder sees one model whose variants still
//! record the original representation: a byte string stays distinct from
//! text, an unsigned integer from a negative one.

use base64::prelude::*;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically-typed wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    /// Non-negative integers
    Unsigned(u64),
    /// Negative integers
    Signed(i64),
    /// Half, single and double precision floats
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
}

impl WireValue {
    /// Short name of the representation, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::Unsigned(_) => "unsigned",
            WireValue::Signed(_) => "signed",
            WireValue::Float(_) => "float",
            WireValue::Text(_) => "text",
            WireValue::Bytes(_) => "bytes",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, WireValue>> {
        match self {
            WireValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns `true` for `null` and for a floating NaN.
    pub fn is_null_like(&self) -> bool {
        match self {
            WireValue::Null => true,
            WireValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Convert into a JSON value. Non-finite floats become `null`,
    /// byte strings become standard base64 text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(*b),
            WireValue::Unsigned(v) => Value::from(*v),
            WireValue::Signed(v) => Value::from(*v),
            WireValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            WireValue::Text(s) => Value::String(s.clone()),
            WireValue::Bytes(b) => Value::String(BASE64_STANDARD.encode(b)),
            WireValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            WireValue::Map(m) => Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for WireValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    WireValue::Unsigned(u)
                } else if let Some(i) = n.as_i64() {
                    WireValue::Signed(i)
                } else {
                    WireValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => WireValue::Text(s),
            Value::Array(items) => WireValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(m) => WireValue::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

// ─── serde ───────────────────────────────────────────────────────────────────

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any CBOR or JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        Ok(match u64::try_from(v) {
            Ok(u) => WireValue::Unsigned(u),
            Err(_) => WireValue::Signed(v),
        })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        Ok(WireValue::Unsigned(v))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<WireValue, E> {
        if let Ok(u) = u64::try_from(v) {
            return Ok(WireValue::Unsigned(u));
        }
        i64::try_from(v)
            .map(WireValue::Signed)
            .map_err(|_| E::custom(format!("integer {v} out of 64-bit range")))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<WireValue, E> {
        u64::try_from(v)
            .map(WireValue::Unsigned)
            .map_err(|_| E::custom(format!("integer {v} out of 64-bit range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<WireValue, E> {
        Ok(WireValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<WireValue, E> {
        Ok(WireValue::Bytes(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        WireValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireValue, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, WireValue>()? {
            entries.insert(key, value);
        }
        Ok(WireValue::Map(entries))
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireValue::Null => serializer.serialize_unit(),
            WireValue::Bool(b) => serializer.serialize_bool(*b),
            WireValue::Unsigned(v) => serializer.serialize_u64(*v),
            WireValue::Signed(v) => serializer.serialize_i64(*v),
            WireValue::Float(v) => serializer.serialize_f64(*v),
            WireValue::Text(s) => serializer.serialize_str(s),
            WireValue::Bytes(b) => serializer.serialize_bytes(b),
            WireValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            WireValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}
