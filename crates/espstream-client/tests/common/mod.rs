//! Shared helpers: an in-memory transport and a handle that plays the
//! server side of it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ciborium::Value;
use espstream_client::{
    ChannelListener, ClientConfig, ClientError, EspClient, Fault, FaultReceiver, StreamEvent,
    Transport, TransportEvent,
};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Inner {
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
    fail_sends: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// Transport half, moved into the client.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

/// Server half, kept by the test.
#[derive(Clone)]
pub struct MockServer {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn pair() -> (Self, MockServer) {
        let t = Self::default();
        let server = MockServer {
            inner: Arc::clone(&t.inner),
        };
        (t, server)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), ClientError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        *self.inner.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::WebSocket("broken pipe".into()));
        }
        self.inner.sent.lock().unwrap().push(text);
        Ok(())
    }

    /// Ends the session: the server half can no longer reach the client.
    async fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.open.store(false, Ordering::SeqCst);
        self.inner.events.lock().unwrap().take();
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    fn url(&self) -> &str {
        "ws://mock/eventStreamProcessing/v2/connect"
    }
}

impl MockServer {
    pub async fn push(&self, event: TransportEvent) {
        let tx = self
            .inner
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("client never connected");
        tx.send(event).await.expect("inbound task gone");
    }

    /// Like `push`, but reports whether a session was there to take it.
    pub async fn try_push(&self, event: TransportEvent) -> bool {
        let tx = self.inner.events.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Make every later send fail while the socket still reports open.
    pub fn fail_sends(&self) {
        self.inner.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Complete the WebSocket upgrade.
    pub async fn open(&self) {
        self.inner.open.store(true, Ordering::SeqCst);
        self.push(TransportEvent::Connected).await;
    }

    pub async fn handshake(&self) {
        self.push(TransportEvent::Text("status: 200\nserver: esp\n\n".into()))
            .await;
    }

    pub async fn text(&self, json: &str) {
        self.push(TransportEvent::Text(json.to_string())).await;
    }

    pub async fn cbor(&self, value: &Value) {
        self.push(TransportEvent::Binary(cbor(value))).await;
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub client: EspClient<MockTransport>,
    pub server: MockServer,
    pub events: mpsc::UnboundedReceiver<StreamEvent>,
    pub faults: FaultReceiver,
}

impl Harness {
    pub fn new() -> Self {
        let (transport, server) = MockTransport::pair();
        let (listener, events) = ChannelListener::new();
        let (client, faults) = EspClient::with_transport(
            transport,
            &ClientConfig::new("ws://mock/eventStreamProcessing/v2/connect"),
            Arc::new(listener),
        );
        Self {
            client,
            server,
            events,
            faults,
        }
    }

    /// Connected, handshaken and `on_connected` observed.
    pub async fn ready() -> Self {
        let mut h = Self::new();
        h.client.connect().await.unwrap();
        h.server.open().await;
        h.server.handshake().await;
        assert_eq!(h.next_event().await, StreamEvent::Connected);
        h
    }

    pub async fn next_event(&mut self) -> StreamEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for stream event")
            .expect("listener channel closed")
    }

    pub async fn next_fault(&mut self) -> Fault {
        tokio::time::timeout(WAIT, self.faults.recv())
            .await
            .expect("timed out waiting for fault")
            .expect("fault channel closed")
    }

    /// Push a project notification and wait for it, proving every earlier
    /// frame has been processed.
    pub async fn barrier(&mut self) {
        self.server
            .text(r#"{"project-loaded":{"name":"__barrier"}}"#)
            .await;
        loop {
            if let StreamEvent::ProjectLoaded(name) = self.next_event().await {
                if name == "__barrier" {
                    return;
                }
            }
        }
    }

    /// Id of the n-th subscription request sent.
    pub fn sent_id(&self, n: usize) -> String {
        let req: serde_json::Value = serde_json::from_str(&self.server.sent()[n]).unwrap();
        req["eventStream"]["id"].as_str().unwrap().to_string()
    }
}

pub fn cbor(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).unwrap();
    buf
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (text(k), v)).collect())
}

/// Compact schema message with one field per `(name, type)`.
pub fn cbor_schema(id: &str, fields: &[(&str, &str)]) -> Value {
    let fields = fields
        .iter()
        .map(|(name, ty)| map(vec![("@name", text(name)), ("@type", text(ty))]))
        .collect();
    map(vec![(
        "schema",
        map(vec![("@id", text(id)), ("fields", Value::Array(fields))]),
    )])
}

pub fn cbor_events(id: &str, entries: Vec<Value>) -> Value {
    map(vec![(
        "events",
        map(vec![("@id", text(id)), ("entries", Value::Array(entries))]),
    )])
}
