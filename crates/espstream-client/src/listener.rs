//! `StreamListener`: callbacks the client invokes from its inbound task.
//!
//! Callbacks run inline with frame processing and must not block for long.

use espstream_core::WindowEvent;
use tokio::sync::mpsc;

/// Receives session lifecycle notifications and decoded events.
/// Every method defaults to a no-op.
pub trait StreamListener: Send + Sync {
    /// The handshake completed and subscriptions may be sent.
    fn on_connected(&self) {}

    fn on_event(&self, _event: WindowEvent) {}

    /// A project was (re)loaded on the server; subscriptions into it are
    /// gone and must be re-requested.
    fn on_project_loaded(&self, _name: &str) {}

    fn on_project_removed(&self, _name: &str) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl StreamListener for NoopListener {}

/// Listener callbacks as values.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Event(WindowEvent),
    ProjectLoaded(String),
    ProjectRemoved(String),
}

/// Forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("stream event receiver dropped");
        }
    }
}

impl StreamListener for ChannelListener {
    fn on_connected(&self) {
        self.forward(StreamEvent::Connected);
    }

    fn on_event(&self, event: WindowEvent) {
        self.forward(StreamEvent::Event(event));
    }

    fn on_project_loaded(&self, name: &str) {
        self.forward(StreamEvent::ProjectLoaded(name.to_string()));
    }

    fn on_project_removed(&self, name: &str) {
        self.forward(StreamEvent::ProjectRemoved(name.to_string()));
    }
}
