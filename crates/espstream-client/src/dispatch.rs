//! Inbound message routing.
//!
//! One [`Dispatcher`] per client, driven by the inbound task. Decodes each
//! frame into an envelope and routes it by kind. Only a contract violation
//! escapes as an error; everything else is logged, counted or turned into
//! a [`Fault`].

use std::sync::{Arc, Mutex, PoisonError};

use espstream_core::codec::{decode_bulk_element, decode_json};
use espstream_core::message::{EventMessage, SchemaMessage};
use espstream_core::{DecodeError, EventDecoder, Frame, Message};
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::Fault;
use crate::fault::FaultSender;
use crate::listener::StreamListener;

/// Maximum bulk nesting unless configured otherwise.
pub const DEFAULT_MAX_BULK_DEPTH: usize = 4;

/// Bytes of an offending payload included in logs.
const LOG_PREVIEW: usize = 256;

/// Counters snapshot for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub frames_received: u64,
    /// Frames (or bulk elements) that could not be decoded or routed
    pub frames_dropped: u64,
    pub events_decoded: u64,
    pub events_dropped: u64,
    pub schemas_attached: u64,
    pub faults_posted: u64,
}

pub struct Dispatcher {
    decoder: EventDecoder,
    listener: Arc<dyn StreamListener>,
    faults: FaultSender,
    max_bulk_depth: usize,
    stats: Mutex<ClientStats>,
}

impl Dispatcher {
    pub fn new(
        decoder: EventDecoder,
        listener: Arc<dyn StreamListener>,
        faults: FaultSender,
        max_bulk_depth: usize,
    ) -> Self {
        Self {
            decoder,
            listener,
            faults,
            max_bulk_depth,
            stats: Mutex::new(ClientStats::default()),
        }
    }

    pub fn listener(&self) -> &dyn StreamListener {
        self.listener.as_ref()
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, update: impl FnOnce(&mut ClientStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Post a fault, waiting until the owner takes it.
    pub async fn post_fault(&self, fault: Fault) {
        error!(%fault, "posting fault");
        self.record(|s| s.faults_posted += 1);
        self.faults.post(fault).await;
    }

    /// Process one non-handshake frame. `Err` means the client must stop.
    pub async fn handle_frame(&self, frame: &Frame) -> Result<(), DecodeError> {
        self.record(|s| s.frames_received += 1);
        let envelope = match frame.decode() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, frame = %frame.preview(LOG_PREVIEW), "cannot decode inbound frame");
                self.record(|s| s.frames_dropped += 1);
                return Ok(());
            }
        };
        self.dispatch(envelope.classify(), frame.as_bytes(), 0).await
    }

    fn dispatch<'a>(
        &'a self,
        message: Message,
        raw: &'a [u8],
        depth: usize,
    ) -> BoxFuture<'a, Result<(), DecodeError>> {
        Box::pin(async move {
            match message {
                Message::Schema(schema) => self.handle_schema(&schema).await,
                Message::Events(events) => return self.handle_events(&events),
                Message::Error(err) => {
                    self.post_fault(Fault::Server(err.text)).await;
                }
                Message::ProjectLoaded(project) => {
                    info!(project = %project.name, "project loaded");
                    self.listener.on_project_loaded(&project.name);
                }
                Message::ProjectRemoved(project) => {
                    info!(project = %project.name, "project removed");
                    self.listener.on_project_removed(&project.name);
                }
                Message::Bulk(elements) => return self.handle_bulk(elements, depth).await,
                Message::Discard(info) => {
                    info!("Events discarded: {} out of {}", info.discarded, info.total);
                }
                Message::Unknown => {
                    let preview = String::from_utf8_lossy(&raw[..raw.len().min(LOG_PREVIEW)]);
                    error!(message = %preview, "unknown message type received");
                    self.record(|s| s.frames_dropped += 1);
                }
            }
            Ok(())
        })
    }

    async fn handle_schema(&self, schema: &SchemaMessage) {
        match self.decoder.apply_schema(schema) {
            Ok(id) => {
                debug!(subscription = %id, fields = schema.fields.len(), "schema attached");
                self.record(|s| s.schemas_attached += 1);
            }
            Err(e @ DecodeError::SubscriptionNotFound { .. }) => {
                warn!(error = %e, "schema for unknown subscription dropped");
            }
            Err(e) => self.post_fault(Fault::Schema(e)).await,
        }
    }

    fn handle_events(&self, message: &EventMessage) -> Result<(), DecodeError> {
        debug!(
            subscription = %message.subscription_id,
            entries = message.entries.len(),
            "event message received"
        );
        for result in self.decoder.decode_events(message) {
            match result {
                Ok(event) => {
                    self.record(|s| s.events_decoded += 1);
                    self.listener.on_event(event);
                }
                Err(e) if e.is_contract_violation() => {
                    self.record(|s| s.events_dropped += 1);
                    return Err(e);
                }
                Err(e @ DecodeError::SubscriptionNotFound { .. }) => {
                    warn!(error = %e, "events for unknown subscription dropped");
                    self.record(|s| s.events_dropped += 1);
                }
                Err(e) => {
                    error!(
                        subscription = %message.subscription_id,
                        error = %e,
                        "error while parsing window event"
                    );
                    self.record(|s| s.events_dropped += 1);
                }
            }
        }
        Ok(())
    }

    /// A bad base64 element is skipped. An element that does not decode as
    /// a JSON envelope abandons the rest of the batch.
    async fn handle_bulk(&self, elements: Vec<String>, depth: usize) -> Result<(), DecodeError> {
        if depth >= self.max_bulk_depth {
            warn!(depth, max = self.max_bulk_depth, "bulk nesting too deep, dropped");
            self.record(|s| s.frames_dropped += 1);
            return Ok(());
        }
        debug!(elements = elements.len(), depth, "bulk message received");

        for encoded in &elements {
            let bytes = match decode_bulk_element(encoded) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "skipping bulk element");
                    self.record(|s| s.frames_dropped += 1);
                    continue;
                }
            };
            let envelope = match decode_json(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(error = %e, "abandoning rest of bulk message");
                    self.record(|s| s.frames_dropped += 1);
                    return Ok(());
                }
            };
            self.dispatch(envelope.classify(), &bytes, depth + 1).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{fault_channel, FaultReceiver};
    use crate::listener::{ChannelListener, StreamEvent};
    use base64::prelude::*;
    use espstream_core::{SubscriptionId, SubscriptionRegistry, WireFormat};
    use tokio::sync::mpsc::UnboundedReceiver;

    const SUB: &str = "p/cq/w/1";

    fn setup(
        format: WireFormat,
    ) -> (Dispatcher, UnboundedReceiver<StreamEvent>, FaultReceiver) {
        let registry = SubscriptionRegistry::new();
        registry.register(SubscriptionId::from(SUB), format, vec![]);
        let (listener, events) = ChannelListener::new();
        let (faults, fault_rx) = fault_channel();
        let d = Dispatcher::new(
            EventDecoder::new(registry),
            Arc::new(listener),
            faults,
            DEFAULT_MAX_BULK_DEPTH,
        );
        (d, events, fault_rx)
    }

    fn text(json: &str) -> Frame {
        Frame::Text(json.to_string())
    }

    fn schema_frame(ty: &str) -> Frame {
        text(&format!(
            r#"{{"schema":{{"@id":"{SUB}","fields":[{{"@name":"v","@type":"{ty}"}}]}}}}"#
        ))
    }

    fn json_event(v: &str) -> String {
        format!(
            r#"{{"events":{{"@id":"{SUB}","entries":[{{"event":{{"@timestamp":"1000000","@opcode":"insert","v":{v}}}}}]}}}}"#
        )
    }

    #[tokio::test]
    async fn schema_then_events_reach_listener() {
        let (d, mut events, _faults) = setup(WireFormat::Json);
        d.handle_frame(&schema_frame("int32")).await.unwrap();
        d.handle_frame(&text(&json_event(r#""42""#))).await.unwrap();

        let Some(StreamEvent::Event(ev)) = events.recv().await else {
            panic!("expected an event");
        };
        assert_eq!(ev.opcode, "insert");
        assert_eq!(ev.fields[0].name, "v");
        let stats = d.stats();
        assert_eq!(stats.schemas_attached, 1);
        assert_eq!(stats.events_decoded, 1);
        assert_eq!(stats.frames_received, 2);
    }

    #[tokio::test]
    async fn unknown_schema_type_posts_schema_fault() {
        let (d, _events, mut faults) = setup(WireFormat::Json);
        let frame = schema_frame("decimal");
        let (handled, fault) = tokio::join!(d.handle_frame(&frame), faults.recv());
        handled.unwrap();
        assert!(matches!(
            fault,
            Some(Fault::Schema(DecodeError::UnknownFieldType { .. }))
        ));
    }

    #[tokio::test]
    async fn server_error_posts_fault() {
        let (d, _events, mut faults) = setup(WireFormat::Json);
        let frame = text(r#"{"error":{"text":"no such window"}}"#);
        let (handled, fault) = tokio::join!(d.handle_frame(&frame), faults.recv());
        handled.unwrap();
        assert!(matches!(fault, Some(Fault::Server(t)) if t == "no such window"));
        assert_eq!(d.stats().faults_posted, 1);
    }

    #[tokio::test]
    async fn contract_violation_escapes() {
        let (d, _events, _faults) = setup(WireFormat::Json);
        d.handle_frame(&schema_frame("int32")).await.unwrap();
        let err = d
            .handle_frame(&text(&json_event(r#""not-a-number""#)))
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[tokio::test]
    async fn bad_event_is_dropped_not_faulted() {
        let (d, mut events, mut faults) = setup(WireFormat::Json);
        // no schema yet
        d.handle_frame(&text(&json_event(r#""1""#))).await.unwrap();
        assert!(events.try_recv().is_err());
        assert!(faults.try_recv().is_none());
        assert_eq!(d.stats().events_dropped, 1);
    }

    #[tokio::test]
    async fn bulk_skips_bad_base64_and_abandons_on_bad_json() {
        let (d, mut events, _faults) = setup(WireFormat::Json);
        d.handle_frame(&schema_frame("int32")).await.unwrap();

        let good = BASE64_STANDARD.encode(json_event(r#""7""#));
        let not_json = BASE64_STANDARD.encode("{oops");
        let bulk = serde_json::json!({ "bulk": [good, "%%%", good, not_json, good] });
        d.handle_frame(&text(&bulk.to_string())).await.unwrap();

        let mut count = 0;
        while let Ok(StreamEvent::Event(_)) = events.try_recv() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(d.stats().frames_dropped, 2);
    }

    #[tokio::test]
    async fn bulk_compact_entry_with_integral_double() {
        let (d, mut events, _faults) = setup(WireFormat::Cbor);
        d.handle_frame(&schema_frame("double")).await.unwrap();

        let inner = serde_json::json!({
            "events": {
                "@id": SUB,
                "entries": [{ "@timestamp": 1_000_000, "@opcode": "i", "v": 21 }]
            }
        });
        let bulk = serde_json::json!({ "bulk": [BASE64_STANDARD.encode(inner.to_string())] });
        d.handle_frame(&text(&bulk.to_string())).await.unwrap();

        let Ok(StreamEvent::Event(ev)) = events.try_recv() else {
            panic!("expected an event");
        };
        assert_eq!(ev.fields[0].value, espstream_core::FieldValue::Double(21.0));
        assert_eq!(d.stats().events_dropped, 0);
    }

    #[tokio::test]
    async fn bulk_nesting_is_capped() {
        let (d, mut events, _faults) = setup(WireFormat::Json);
        d.handle_frame(&schema_frame("int32")).await.unwrap();

        let mut payload = json_event(r#""1""#);
        for _ in 0..DEFAULT_MAX_BULK_DEPTH + 1 {
            payload = serde_json::json!({ "bulk": [BASE64_STANDARD.encode(&payload)] }).to_string();
        }
        d.handle_frame(&text(&payload)).await.unwrap();
        assert!(events.try_recv().is_err());

        let mut payload = json_event(r#""1""#);
        for _ in 0..DEFAULT_MAX_BULK_DEPTH {
            payload = serde_json::json!({ "bulk": [BASE64_STANDARD.encode(&payload)] }).to_string();
        }
        d.handle_frame(&text(&payload)).await.unwrap();
        assert!(matches!(events.try_recv(), Ok(StreamEvent::Event(_))));
    }

    #[tokio::test]
    async fn project_notifications_and_malformed_frames() {
        let (d, mut events, _faults) = setup(WireFormat::Json);
        d.handle_frame(&text(r#"{"project-loaded":{"name":"p"}}"#)).await.unwrap();
        d.handle_frame(&text(r#"{"project-removed":{"name":"p"}}"#)).await.unwrap();
        d.handle_frame(&text("{garbage")).await.unwrap();
        d.handle_frame(&text(r#"{"info":{"type":"event_source_discard","data":{"discarded":1,"total":2}}}"#))
            .await
            .unwrap();

        assert_eq!(events.try_recv().unwrap(), StreamEvent::ProjectLoaded("p".into()));
        assert_eq!(events.try_recv().unwrap(), StreamEvent::ProjectRemoved("p".into()));
        assert!(events.try_recv().is_err());
        assert_eq!(d.stats().frames_dropped, 1);
    }
}
