//! Envelope codec: raw frame → [`MessageEnvelope`].
//!
//! Text frames are always JSON. Binary frames are tried as the compact
//! encoding first (CBOR) and fall back to JSON when they are not a single
//! well-formed CBOR item.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecodeError;
use crate::message::MessageEnvelope;

/// Literal status line that opens every session.
pub const HANDSHAKE_PREFIX: &[u8] = b"status: 200\n";

/// Wire format negotiated for a subscription's event data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Compact binary encoding
    #[default]
    Cbor,
    Json,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Cbor => "cbor",
            WireFormat::Json => "json",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbor" => Ok(WireFormat::Cbor),
            "json" => Ok(WireFormat::Json),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

/// One inbound WebSocket payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(s) => s.as_bytes(),
            Frame::Binary(b) => b,
        }
    }

    /// Returns `true` if the payload starts with the handshake status line,
    /// whichever framing carried it.
    pub fn is_handshake(&self) -> bool {
        self.as_bytes().starts_with(HANDSHAKE_PREFIX)
    }

    /// Up to `max` bytes of the payload as lossy text, for logs.
    pub fn preview(&self, max: usize) -> String {
        let bytes = self.as_bytes();
        String::from_utf8_lossy(&bytes[..bytes.len().min(max)]).into_owned()
    }

    /// Decode this frame's envelope.
    pub fn decode(&self) -> Result<MessageEnvelope, DecodeError> {
        match self {
            Frame::Text(text) => decode_json(text.as_bytes()),
            Frame::Binary(data) => decode_binary(data),
        }
    }
}

/// Returns the parsed CBOR item if `data` is exactly one well-formed item.
fn parse_cbor(data: &[u8]) -> Option<ciborium::Value> {
    let mut cursor = data;
    let value: ciborium::Value = ciborium::from_reader(&mut cursor).ok()?;
    cursor.is_empty().then_some(value)
}

/// Returns `true` if `data` validates as the compact encoding.
pub fn is_cbor(data: &[u8]) -> bool {
    parse_cbor(data).is_some()
}

/// Decode a binary frame: compact encoding if it validates, JSON otherwise.
pub fn decode_binary(data: &[u8]) -> Result<MessageEnvelope, DecodeError> {
    match parse_cbor(data) {
        Some(value) => value
            .deserialized::<MessageEnvelope>()
            .map_err(|e| DecodeError::MalformedEnvelope {
                format: "cbor",
                reason: e.to_string(),
            }),
        None => decode_json(data),
    }
}

/// Decode a JSON envelope.
pub fn decode_json(data: &[u8]) -> Result<MessageEnvelope, DecodeError> {
    serde_json::from_slice(data).map_err(|e| DecodeError::MalformedEnvelope {
        format: "json",
        reason: e.to_string(),
    })
}

/// Base64-decode one element of a bulk envelope.
pub fn decode_bulk_element(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64_STANDARD.decode(encoded)?)
}
