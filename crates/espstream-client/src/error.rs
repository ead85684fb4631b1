//! Client-side errors and the faults reported through the fault channel.

use espstream_core::DecodeError;
use thiserror::Error;

/// Errors returned directly to callers of [`crate::EspClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("cannot serialize subscription request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("invalid authorization header: {0}")]
    InvalidAuthorization(String),
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidAddress(e.to_string())
    }
}

/// A failure reported asynchronously to the owner of the client.
///
/// Event-level decode problems are logged and never show up here.
#[derive(Debug, Error)]
pub enum Fault {
    /// A schema announcement used a type the client does not know.
    #[error("schema error: {0}")]
    Schema(DecodeError),

    /// The server sent an `error` message.
    #[error("server error: {0}")]
    Server(String),

    /// The WebSocket could not be opened or failed mid-session.
    #[error("websocket connection error: {0}")]
    Connection(String),

    /// The client hit an unrecoverable decode error and shut itself down.
    #[error("fatal decode error: {0}")]
    Fatal(DecodeError),
}

impl Fault {
    /// Returns `true` once the client has torn itself down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_messages() {
        let f = Fault::Server("window not found".into());
        assert_eq!(f.to_string(), "server error: window not found");

        let f = Fault::Schema(DecodeError::UnknownFieldType { name: "decimal".into() });
        assert!(f.to_string().contains("decimal"));
        assert!(!f.is_fatal());

        let f = Fault::Fatal(DecodeError::ContractViolation {
            field: "a".into(),
            reason: "x".into(),
        });
        assert!(f.is_fatal());
    }

    #[test]
    fn url_errors_become_invalid_address() {
        let e: ClientError = url::Url::parse("::nope").unwrap_err().into();
        assert!(matches!(e, ClientError::InvalidAddress(_)));
    }
}
