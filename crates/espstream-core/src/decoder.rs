//! The event/field decoder.
//!
//! Turns schema announcements into [`FieldSchema`]s and raw event entries
//! into [`WindowEvent`]s. Every field is validated against its declared
//! [`SchemaFieldType`] before conversion; the accepted representation per
//! type and per wire format lives in [`decode_compact_field`] and
//! [`decode_json_field`] and nowhere else.
//!
//! The two formats disagree about the same logical value:
//!
//! | type      | compact (CBOR)        | JSON                                  |
//! |-----------|-----------------------|---------------------------------------|
//! | array     | array                 | (no conversion)                       |
//! | blob      | byte string           | `{"*value": "<base64>"}`              |
//! | double    | float or integer      | decimal text                          |
//! | int       | any integer           | decimal text                          |
//! | timestamp | unsigned, µs          | decimal text, µs                      |
//! | date      | unsigned, s           | decimal text, s                       |
//! | string    | text                  | text                                  |
//!
//! JSON entries are also nested one level under an `"event"` key.
//!
//! Bulk elements carry compact entries as JSON text, which drops the
//! float/integer distinction, so an integral double arrives as an integer.

use base64::prelude::*;
use std::collections::BTreeMap;

use crate::codec::WireFormat;
use crate::error::DecodeError;
use crate::event::{parse_event_time, time_from_micros, time_from_secs, WindowEvent, OPCODE_KEY, TIMESTAMP_KEY};
use crate::message::{EventMessage, SchemaMessage};
use crate::registry::{FieldSchema, Subscription, SubscriptionId, SubscriptionRegistry};
use crate::types::{is_internal_field_name, Field, FieldValue, SchemaFieldType};
use crate::wire::WireValue;

/// Key holding the base64 payload of a JSON blob value.
pub const BLOB_VALUE_KEY: &str = "*value";

/// Key wrapping the real entry of a JSON-format event.
pub const JSON_EVENT_KEY: &str = "event";

/// Resolve every field definition of a schema announcement through the
/// type table. Fails on the first unknown type name.
pub fn decode_schema(message: &SchemaMessage) -> Result<FieldSchema, DecodeError> {
    message
        .fields
        .iter()
        .map(|def| SchemaFieldType::parse(&def.ty).map(|ty| (def.name.clone(), ty)))
        .collect()
}

/// Decode one raw event entry of a subscription.
pub fn decode_entry(sub: &Subscription, entry: &WireValue) -> Result<WindowEvent, DecodeError> {
    let entry = unwrap_entry(sub.format, entry)?;

    let time = match entry.get(TIMESTAMP_KEY) {
        Some(raw) => parse_event_time(raw)?,
        None => {
            return Err(DecodeError::InvalidTimestamp {
                value: "missing".into(),
                reason: format!("entry has no {TIMESTAMP_KEY}"),
            })
        }
    };

    let opcode = match entry.get(OPCODE_KEY) {
        Some(WireValue::Text(op)) => op.clone(),
        Some(other) => return Err(DecodeError::InvalidOpcode { got: other.kind() }),
        None => return Err(DecodeError::InvalidOpcode { got: "missing" }),
    };

    let fields = decode_fields(sub, entry)?;
    Ok(WindowEvent::new(time, opcode, fields))
}

fn unwrap_entry(
    format: WireFormat,
    entry: &WireValue,
) -> Result<&BTreeMap<String, WireValue>, DecodeError> {
    let map = entry
        .as_map()
        .ok_or(DecodeError::InvalidEntry { got: entry.kind() })?;
    match format {
        WireFormat::Cbor => Ok(map),
        WireFormat::Json => map
            .get(JSON_EVENT_KEY)
            .and_then(WireValue::as_map)
            .ok_or(DecodeError::MissingEventBody),
    }
}

/// Non-reserved fields in ascending byte-wise name order.
fn decode_fields(
    sub: &Subscription,
    entry: &BTreeMap<String, WireValue>,
) -> Result<Vec<Field>, DecodeError> {
    // BTreeMap<String, _> iterates in byte-wise key order.
    entry
        .iter()
        .filter(|(name, _)| !is_internal_field_name(name))
        .map(|(name, raw)| -> Result<Field, DecodeError> {
            let ty = schema_type(sub, name)?;
            let value = match sub.format {
                WireFormat::Cbor => decode_compact_field(name, raw, ty)?,
                WireFormat::Json => decode_json_field(name, raw, ty)?,
            };
            Ok(Field::new(name.clone(), value))
        })
        .collect()
}

fn schema_type(sub: &Subscription, name: &str) -> Result<SchemaFieldType, DecodeError> {
    let schema = sub.schema.as_ref().ok_or_else(|| DecodeError::SchemaMissing {
        field: name.to_string(),
    })?;
    schema
        .get(name)
        .copied()
        .ok_or_else(|| DecodeError::UnknownField {
            field: name.to_string(),
        })
}

fn mismatch(name: &str, ty: SchemaFieldType, raw: &WireValue) -> DecodeError {
    DecodeError::TypeMismatch {
        field: name.to_string(),
        expected: ty.to_string(),
        got: raw.kind(),
    }
}

fn out_of_range(name: &str, value: impl ToString) -> DecodeError {
    DecodeError::ValueOutOfRange {
        field: name.to_string(),
        value: value.to_string(),
    }
}

/// Validate and convert a field carried by the compact encoding.
pub fn decode_compact_field(
    name: &str,
    raw: &WireValue,
    ty: SchemaFieldType,
) -> Result<FieldValue, DecodeError> {
    use SchemaFieldType as T;

    match (ty, raw) {
        (T::Array, WireValue::Array(items)) => Ok(FieldValue::Array(serde_json::Value::Array(
            items
                .iter()
                .map(|item| {
                    if item.is_null_like() {
                        serde_json::Value::Null
                    } else {
                        item.to_json()
                    }
                })
                .collect(),
        ))),
        (T::Blob, WireValue::Bytes(bytes)) => Ok(FieldValue::Blob(BASE64_STANDARD.encode(bytes))),
        (T::Double, WireValue::Float(v)) => Ok(FieldValue::Double(*v)),
        (T::Double, WireValue::Unsigned(v)) => Ok(FieldValue::Double(*v as f64)),
        (T::Double, WireValue::Signed(v)) => Ok(FieldValue::Double(*v as f64)),
        (T::Int, WireValue::Unsigned(_) | WireValue::Signed(_)) => Ok(FieldValue::from(raw.clone())),
        (T::Timestamp, WireValue::Unsigned(micros)) => i64::try_from(*micros)
            .ok()
            .and_then(time_from_micros)
            .map(FieldValue::Timestamp)
            .ok_or_else(|| out_of_range(name, micros)),
        (T::Date, WireValue::Unsigned(secs)) => i64::try_from(*secs)
            .ok()
            .and_then(time_from_secs)
            .map(FieldValue::Date)
            .ok_or_else(|| out_of_range(name, secs)),
        (T::String, WireValue::Text(s)) => Ok(FieldValue::Str(s.clone())),
        _ => Err(mismatch(name, ty, raw)),
    }
}

/// Validate and convert a field carried by the JSON encoding, where every
/// value arrives as text (blobs as a single-key object).
///
/// A value that validates as text but does not parse as the declared
/// numeric type is a [`DecodeError::ContractViolation`], as is a declared
/// type with no JSON conversion.
pub fn decode_json_field(
    name: &str,
    raw: &WireValue,
    ty: SchemaFieldType,
) -> Result<FieldValue, DecodeError> {
    use SchemaFieldType as T;

    let text = match (ty, raw) {
        (T::Blob, WireValue::Map(map)) => match map.get(BLOB_VALUE_KEY) {
            Some(WireValue::Text(s)) => s.as_str(),
            None | Some(WireValue::Null) => {
                return Err(DecodeError::BlobValueMissing {
                    field: name.to_string(),
                })
            }
            Some(other) => return Err(mismatch(name, ty, other)),
        },
        (T::Blob, _) => return Err(mismatch(name, ty, raw)),
        (_, WireValue::Text(s)) => s.as_str(),
        _ => return Err(mismatch(name, ty, raw)),
    };

    let violation = |reason: String| DecodeError::ContractViolation {
        field: name.to_string(),
        reason,
    };
    let parse_int = |kind: &str| {
        text.trim()
            .parse::<i64>()
            .map_err(|e| violation(format!("cannot convert '{text}' to {kind}: {e}")))
    };

    match ty {
        T::Blob => Ok(FieldValue::Blob(text.to_string())),
        T::String => Ok(FieldValue::Str(text.to_string())),
        T::Double => text
            .trim()
            .parse::<f64>()
            .map(FieldValue::Double)
            .map_err(|e| violation(format!("cannot convert '{text}' to double: {e}"))),
        T::Int => parse_int("int").map(FieldValue::Int),
        T::Timestamp => {
            let micros = parse_int("timestamp")?;
            time_from_micros(micros)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| out_of_range(name, micros))
        }
        T::Date => {
            let secs = parse_int("date")?;
            time_from_secs(secs)
                .map(FieldValue::Date)
                .ok_or_else(|| out_of_range(name, secs))
        }
        T::Array => Err(violation(format!("unsupported field type {ty} for JSON values"))),
    }
}

/// Registry-backed decoder used by the inbound frame path.
#[derive(Clone, Default)]
pub struct EventDecoder {
    registry: SubscriptionRegistry,
}

impl EventDecoder {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Resolve a schema announcement and attach it to its subscription.
    pub fn apply_schema(&self, message: &SchemaMessage) -> Result<SubscriptionId, DecodeError> {
        let schema = decode_schema(message)?;
        let id = SubscriptionId::from(message.subscription_id.as_str());
        self.registry.attach_schema(&id, schema)?;
        Ok(id)
    }

    /// Decode the entries of an events message one at a time. Each item is
    /// independent: a failed entry does not affect the others.
    pub fn decode_events<'a>(
        &self,
        message: &'a EventMessage,
    ) -> impl Iterator<Item = Result<WindowEvent, DecodeError>> + 'a {
        let id = SubscriptionId::from(message.subscription_id.as_str());
        let sub = self.registry.get(&id).ok();
        message.entries.iter().map(move |entry| match &sub {
            Some(sub) => decode_entry(sub, entry),
            None => Err(DecodeError::SubscriptionNotFound { id: id.to_string() }),
        })
    }
}
