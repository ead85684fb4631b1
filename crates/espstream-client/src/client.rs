//! `EspClient`: one WebSocket session to the event stream endpoint.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use espstream_core::message::{EventStreamRequest, SubscriptionRequest};
use espstream_core::registry::window_path;
use espstream_core::{EventDecoder, Frame, SubscriptionId, SubscriptionRegistry, WireFormat};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ClientConfig, SubscriptionConfig};
use crate::dispatch::{ClientStats, Dispatcher};
use crate::error::{ClientError, Fault};
use crate::fault::{fault_channel, FaultReceiver};
use crate::listener::StreamListener;
use crate::state::{ConnectionState, ConnectionStateMachine, FrameAction};
use crate::transport::{Transport, TransportEvent, WsTransport};

/// Format requested for every subscription.
pub const REQUEST_FORMAT: WireFormat = WireFormat::Cbor;

type SharedState = Arc<Mutex<ConnectionStateMachine>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ConnectionStateMachine> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streaming client.
///
/// Owns the transport, the subscription registry and an inbound task that
/// runs for each session. Decoded events go to the [`StreamListener`];
/// faults go to the [`FaultReceiver`] returned by the constructor.
///
/// # Usage
/// ```no_run
/// # async fn example() -> Result<(), espstream_client::ClientError> {
/// use std::sync::Arc;
/// use espstream_client::{ChannelListener, ClientConfig, EspClient};
///
/// let (listener, mut events) = ChannelListener::new();
/// let (client, mut faults) = EspClient::new(
///     ClientConfig::new("ws://localhost:31415/eventStreamProcessing/v2/connect"),
///     Arc::new(listener),
/// );
/// client.connect().await?;
/// // wait for StreamEvent::Connected, then subscribe
/// # Ok(())
/// # }
/// ```
pub struct EspClient<T: Transport = WsTransport> {
    transport: Arc<T>,
    registry: SubscriptionRegistry,
    state: SharedState,
    dispatcher: Arc<Dispatcher>,
    inbound_capacity: usize,
    inbound: Mutex<Option<JoinHandle<()>>>,
}

impl EspClient<WsTransport> {
    /// Client over a real WebSocket.
    pub fn new(config: ClientConfig, listener: Arc<dyn StreamListener>) -> (Self, FaultReceiver) {
        let transport = WsTransport::new(config.url.clone(), config.authorization.clone());
        Self::with_transport(transport, &config, listener)
    }
}

impl<T: Transport> EspClient<T> {
    pub fn with_transport(
        transport: T,
        config: &ClientConfig,
        listener: Arc<dyn StreamListener>,
    ) -> (Self, FaultReceiver) {
        let registry = SubscriptionRegistry::new();
        let (faults, fault_rx) = fault_channel();
        let dispatcher = Dispatcher::new(
            EventDecoder::new(registry.clone()),
            listener,
            faults,
            config.max_bulk_depth,
        );
        let client = Self {
            transport: Arc::new(transport),
            registry,
            state: SharedState::default(),
            dispatcher: Arc::new(dispatcher),
            inbound_capacity: config.inbound_capacity.max(1),
            inbound: Mutex::new(None),
        };
        (client, fault_rx)
    }

    /// Open the WebSocket and start the inbound task. Does not wait for the
    /// handshake; `on_connected` fires once it completes. Calling again
    /// while a session is pending or live does nothing.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if !lock(&self.state).begin_connect() {
            debug!(state = %self.state(), "connect ignored");
            return Ok(());
        }
        info!(url = %self.transport.url(), "connecting");

        let (tx, rx) = mpsc::channel(self.inbound_capacity);
        let task = tokio::spawn(run_inbound(
            rx,
            Arc::clone(&self.state),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.transport),
        ));
        if let Some(old) = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            old.abort();
        }

        if let Err(e) = self.transport.connect(tx).await {
            lock(&self.state).on_disconnected();
            return Err(e);
        }
        Ok(())
    }

    /// Request a window's event stream. The subscription is registered
    /// before the request is sent so that the server's schema always finds
    /// it.
    pub async fn subscribe(
        &self,
        project: &str,
        cq: &str,
        window: &str,
        interval: u64,
        max_events: u64,
        fields: Vec<String>,
    ) -> Result<SubscriptionId, ClientError> {
        if !self.transport.is_open() {
            return Err(ClientError::NotConnected);
        }

        let id = SubscriptionId::generate(project, cq, window);
        let request = SubscriptionRequest {
            event_stream: EventStreamRequest {
                action: "set".into(),
                id: id.to_string(),
                window: window_path(project, cq, window),
                schema: true,
                update_deletes: true,
                format: REQUEST_FORMAT.to_string(),
                interval,
                max_events,
                page_size: None,
                include: fields.clone(),
            },
        };
        let body = serde_json::to_string(&request)?;

        self.registry.register(id.clone(), REQUEST_FORMAT, fields);
        if let Err(e) = self.transport.send_text(body).await {
            self.registry.remove(&id);
            return Err(e);
        }
        info!(subscription = %id, "subscribed");
        Ok(id)
    }

    pub async fn subscribe_with(&self, sub: &SubscriptionConfig) -> Result<SubscriptionId, ClientError> {
        self.subscribe(
            &sub.project,
            &sub.cq,
            &sub.window,
            sub.interval,
            sub.max_events,
            sub.fields.clone(),
        )
        .await
    }

    /// Close the session, live or still connecting, and stop the inbound
    /// task. Always leaves the client `Disconnected`.
    pub async fn close(&self) {
        info!(state = %self.state(), "closing connection");
        lock(&self.state).on_disconnected();
        self.transport.close().await;
        let task = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.state).state()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> ClientStats {
        self.dispatcher.stats()
    }
}

impl<T: Transport> Drop for EspClient<T> {
    fn drop(&mut self) {
        let task = self.inbound.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Inbound task: one per session, the only consumer of transport events.
async fn run_inbound<T: Transport>(
    mut events: mpsc::Receiver<TransportEvent>,
    state: SharedState,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<T>,
) {
    while let Some(event) = events.recv().await {
        let frame = match event {
            TransportEvent::Connected => {
                info!("WebSocket opened, awaiting handshake");
                lock(&state).on_transport_open();
                continue;
            }
            TransportEvent::ConnectError(reason) => {
                lock(&state).on_disconnected();
                dispatcher.post_fault(Fault::Connection(reason)).await;
                continue;
            }
            TransportEvent::Disconnected(reason) => {
                lock(&state).on_disconnected();
                match reason {
                    Some(reason) => dispatcher.post_fault(Fault::Connection(reason)).await,
                    None => info!("WebSocket closed"),
                }
                continue;
            }
            TransportEvent::Text(text) => Frame::Text(text),
            TransportEvent::Binary(data) => Frame::Binary(data),
        };

        let action = lock(&state).on_frame(&frame);
        match action {
            FrameAction::Handshake => {
                info!("handshake complete");
                dispatcher.listener().on_connected();
                continue;
            }
            FrameAction::Discard => {
                debug!("frame after close discarded");
                continue;
            }
            FrameAction::Dispatch => {}
        }

        if let Err(fatal) = dispatcher.handle_frame(&frame).await {
            error!(error = %fatal, "unrecoverable decode error, shutting down");
            transport.close().await;
            lock(&state).on_disconnected();
            dispatcher.post_fault(Fault::Fatal(fatal)).await;
            break;
        }
    }
    debug!("inbound task finished");
}
