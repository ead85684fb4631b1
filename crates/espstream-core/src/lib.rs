//! # espstream-core
//!
//! Wire model and decoding pipeline for an event-stream-processing
//! server's streaming protocol. Everything here is I/O free; the client
//! crate feeds it frames and routes what comes out.
//!
//! - [`codec`]: frame → envelope (compact CBOR or JSON)
//! - [`message`]: envelope classification and the subscription request
//! - [`registry`]: per-subscription format, fields and schema
//! - [`decoder`]: schema resolution and per-field validate-then-convert
//! - [`types`] / [`event`]: the uniform event model handed to callers

pub mod codec;
pub mod decoder;
pub mod error;
pub mod event;
pub mod message;
pub mod registry;
pub mod types;
pub mod wire;

pub use codec::{Frame, WireFormat, HANDSHAKE_PREFIX};
pub use decoder::EventDecoder;
pub use error::{DecodeError, RegistryError};
pub use event::WindowEvent;
pub use message::{Message, MessageEnvelope, SubscriptionRequest};
pub use registry::{FieldSchema, Subscription, SubscriptionId, SubscriptionRegistry};
pub use types::{Field, FieldValue, SchemaFieldType};
pub use wire::WireValue;
