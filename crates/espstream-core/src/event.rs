//! Decoded window events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::DecodeError;
use crate::types::Field;
use crate::wire::WireValue;

/// Reserved entry key carrying the event time.
pub const TIMESTAMP_KEY: &str = "@timestamp";
/// Reserved entry key carrying the operation code.
pub const OPCODE_KEY: &str = "@opcode";

/// One decoded occurrence from a window, the primary output of ESPStream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowEvent {
    pub time: DateTime<Utc>,
    /// Operation tag, e.g. `"i"` (insert), `"u"` (update), `"d"` (delete)
    pub opcode: String,
    /// Sorted by name, reserved `@` names excluded
    pub fields: Vec<Field>,
}

impl WindowEvent {
    pub fn new(time: DateTime<Utc>, opcode: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            time,
            opcode: opcode.into(),
            fields,
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.fields[idx])
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<_> = self.fields.iter().map(|x| x.to_string()).collect();
        write!(
            f,
            "WindowEvent{{time={}, opcode={}, fields=[{}]}}",
            self.time.to_rfc3339(),
            self.opcode,
            fields.join(", ")
        )
    }
}

/// Microseconds since the Unix epoch → absolute time.
pub fn time_from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Seconds since the Unix epoch → absolute time.
pub fn time_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Parse an `@timestamp` value: a decimal string, a signed integer or an
/// unsigned 64-bit integer, all microseconds since the epoch.
pub fn parse_event_time(raw: &WireValue) -> Result<DateTime<Utc>, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidTimestamp {
        value: format!("{raw:?}"),
        reason,
    };

    let micros = match raw {
        WireValue::Text(s) => s.trim().parse::<i64>().map_err(|e| invalid(e.to_string()))?,
        WireValue::Signed(v) => *v,
        WireValue::Unsigned(v) => {
            i64::try_from(*v).map_err(|_| invalid("exceeds the signed 64-bit range".into()))?
        }
        other => return Err(invalid(format!("invalid argument type {}", other.kind()))),
    };

    time_from_micros(micros).ok_or_else(|| invalid("out of range for a timestamp".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    #[test]
    fn timestamp_representations_agree() {
        let from_text = parse_event_time(&WireValue::Text("1700000000000000".into())).unwrap();
        let from_signed = parse_event_time(&WireValue::Signed(1_700_000_000_000_000)).unwrap();
        let from_unsigned = parse_event_time(&WireValue::Unsigned(1_700_000_000_000_000)).unwrap();
        assert_eq!(from_text, from_signed);
        assert_eq!(from_signed, from_unsigned);
        assert_eq!(from_text.timestamp(), 1_700_000_000);
    }

    #[test]
    fn negative_timestamp_is_before_epoch() {
        let t = parse_event_time(&WireValue::Signed(-1_000_000)).unwrap();
        assert_eq!(t.timestamp(), -1);
    }

    #[test]
    fn float_timestamp_rejected() {
        let err = parse_event_time(&WireValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn garbage_text_timestamp_rejected() {
        assert!(parse_event_time(&WireValue::Text("yesterday".into())).is_err());
    }

    #[test]
    fn field_lookup_by_name() {
        let ev = WindowEvent::new(
            time_from_micros(0).unwrap(),
            "i",
            vec![
                Field::new("a", FieldValue::Int(1)),
                Field::new("b", FieldValue::Int(2)),
            ],
        );
        assert_eq!(ev.field("b").unwrap().value, FieldValue::Int(2));
        assert!(ev.field("c").is_none());
    }
}
