//! Error types for the ESPStream decode pipeline.

use thiserror::Error;

/// Errors that can occur while decoding an inbound frame, a schema
/// message or a single event entry.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown schema field type: {name}")]
    UnknownFieldType { name: String },

    #[error("malformed {format} envelope: {reason}")]
    MalformedEnvelope { format: &'static str, reason: String },

    #[error("cannot decode base64 bulk element: {0}")]
    InvalidBulkElement(#[from] base64::DecodeError),

    #[error("subscription '{id}' not found")]
    SubscriptionNotFound { id: String },

    #[error("event entry must be a map, got {got}")]
    InvalidEntry { got: &'static str },

    #[error("event entry has no nested 'event' map")]
    MissingEventBody,

    #[error("invalid event timestamp ({value}): {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("unexpected value type {got} for event opcode")]
    InvalidOpcode { got: &'static str },

    #[error("no schema received for field: {field}")]
    SchemaMissing { field: String },

    #[error("no schema type found for field: {field}")]
    UnknownField { field: String },

    #[error("unexpected value type {got} for field {field} (declared {expected})")]
    TypeMismatch {
        field: String,
        expected: String,
        got: &'static str,
    },

    #[error("blob value for field {field} is missing")]
    BlobValueMissing { field: String },

    #[error("value {value} of field {field} is out of range")]
    ValueOutOfRange { field: String, value: String },

    /// The negotiated schema and the decoder's type table disagree.
    /// Unrecoverable for the whole client.
    #[error("contract violation for field {field}: {reason}")]
    ContractViolation { field: String, reason: String },
}

impl DecodeError {
    /// Returns `true` for the error class that must terminate the client
    /// rather than drop a single event.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation { .. })
    }
}

impl From<RegistryError> for DecodeError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { id } => DecodeError::SubscriptionNotFound { id },
        }
    }
}

/// Errors from the subscription registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("subscription '{id}' not found")]
    NotFound { id: String },
}
