//! # espstream-client
//!
//! WebSocket streaming client for ESP windows.
//!
//! Opens a session to the server's event stream endpoint, completes the
//! status-line handshake, sends subscription requests and turns inbound
//! frames into [`WindowEvent`](espstream_core::WindowEvent)s.
//!
//! ## Architecture
//! ```text
//! WsTransport (socket task)
//!       │  TransportEvent, bounded
//!       ▼
//! inbound task ── handshake ──▶ StreamListener::on_connected
//!       │
//!       ▼
//! Dispatcher (schema / events / bulk / error / project / info)
//!       │                        │
//!       ▼                        ▼
//! StreamListener::on_event   FaultReceiver (single slot)
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fault;
pub mod listener;
pub mod state;
pub mod transport;

pub use client::EspClient;
pub use config::{ClientConfig, ServerAddress, SubscriptionConfig};
pub use dispatch::ClientStats;
pub use error::{ClientError, Fault};
pub use fault::{FaultReceiver, FaultSender};
pub use listener::{ChannelListener, NoopListener, StreamEvent, StreamListener};
pub use state::ConnectionState;
pub use transport::{Transport, TransportEvent, WsTransport};
