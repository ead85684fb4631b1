//! Connection lifecycle.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──socket open──▶ AwaitingHandshake
//!      ▲                                                        │
//!      └──────── close() / socket lost ◀── Ready ◀── "status: 200\n"
//! ```

use std::fmt;

use espstream_core::Frame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingHandshake => "awaiting-handshake",
            ConnectionState::Ready => "ready",
        })
    }
}

/// What to do with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// The frame completed the handshake and is consumed.
    Handshake,
    /// Hand the frame to the dispatcher.
    Dispatch,
    /// No session is wanted; drop the frame.
    Discard,
}

#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Start a connection attempt. Returns `false` if one is already
    /// pending or live.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn on_transport_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::AwaitingHandshake;
        }
    }

    /// Until the session is ready, a frame starting with the status line
    /// completes the handshake. Anything else is dispatched, unless the
    /// client has been closed.
    pub fn on_frame(&mut self, frame: &Frame) -> FrameAction {
        if self.state == ConnectionState::Disconnected {
            return FrameAction::Discard;
        }
        if self.state != ConnectionState::Ready && frame.is_handshake() {
            self.state = ConnectionState::Ready;
            return FrameAction::Handshake;
        }
        FrameAction::Dispatch
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
