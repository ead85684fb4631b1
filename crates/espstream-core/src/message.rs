//! Wire messages: the inbound envelope and the outbound subscription request.
//!
//! An inbound frame carries exactly one populated member. The same
//! structs are used for the compact and the JSON encoding.

use serde::{Deserialize, Serialize};

use crate::wire::WireValue;

/// `info.type` of a discard notice.
pub const EVENT_SOURCE_DISCARD: &str = "event_source_discard";

/// A decoded inbound payload, before classification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEnvelope {
    #[serde(default)]
    pub schema: Option<SchemaMessage>,
    #[serde(default)]
    pub events: Option<EventMessage>,
    #[serde(default)]
    pub error: Option<ErrorMessage>,
    #[serde(default, rename = "project-loaded")]
    pub project_loaded: Option<ProjectMessage>,
    #[serde(default, rename = "project-removed")]
    pub project_removed: Option<ProjectMessage>,
    /// Base64 strings, each the JSON encoding of a nested envelope
    #[serde(default)]
    pub bulk: Option<Vec<String>>,
    #[serde(default)]
    pub info: Option<InfoMessage>,
}

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum Message {
    Schema(SchemaMessage),
    Events(EventMessage),
    Error(ErrorMessage),
    ProjectLoaded(ProjectMessage),
    ProjectRemoved(ProjectMessage),
    Bulk(Vec<String>),
    Discard(DiscardInfo),
    Unknown,
}

impl Message {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Schema(_) => "schema",
            Message::Events(_) => "events",
            Message::Error(_) => "error",
            Message::ProjectLoaded(_) => "project-loaded",
            Message::ProjectRemoved(_) => "project-removed",
            Message::Bulk(_) => "bulk",
            Message::Discard(_) => "info",
            Message::Unknown => "unknown",
        }
    }
}

impl MessageEnvelope {
    /// Classify by the first populated member in fixed priority order:
    /// schema, events, error, project-loaded, project-removed, bulk, info.
    pub fn classify(self) -> Message {
        if let Some(m) = self.schema {
            return Message::Schema(m);
        }
        if let Some(m) = self.events {
            return Message::Events(m);
        }
        if let Some(m) = self.error {
            return Message::Error(m);
        }
        if let Some(m) = self.project_loaded {
            return Message::ProjectLoaded(m);
        }
        if let Some(m) = self.project_removed {
            return Message::ProjectRemoved(m);
        }
        if let Some(m) = self.bulk {
            return Message::Bulk(m);
        }
        match self.info {
            Some(info) if info.kind == EVENT_SOURCE_DISCARD => Message::Discard(info.data),
            _ => Message::Unknown,
        }
    }
}

/// Schema announcement for one subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaMessage {
    #[serde(rename = "@id")]
    pub subscription_id: String,
    #[serde(rename = "@window", default)]
    pub window: String,
    #[serde(default)]
    pub fields: Vec<SchemaFieldDef>,
    #[serde(rename = "schema-string", default)]
    pub schema_string: Option<String>,
}

/// One field of a schema announcement.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFieldDef {
    #[serde(rename = "@key", default)]
    pub key: Option<WireValue>,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub ty: String,
}

/// A batch of event entries for one subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "@id")]
    pub subscription_id: String,
    #[serde(default)]
    pub entries: Vec<WireValue>,
}

/// Server-reported error.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub text: String,
}

/// `project-loaded` / `project-removed` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMessage {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfoMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: DiscardInfo,
}

/// Counters of a discard notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DiscardInfo {
    #[serde(default)]
    pub discarded: u64,
    #[serde(default)]
    pub total: u64,
}

// ─── Outbound ────────────────────────────────────────────────────────────────

/// The subscription request, sent as a JSON text frame.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "eventStream")]
    pub event_stream: EventStreamRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventStreamRequest {
    pub action: String,
    pub id: String,
    pub window: String,
    pub schema: bool,
    #[serde(rename = "update-deletes")]
    pub update_deletes: bool,
    pub format: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub interval: u64,
    #[serde(rename = "maxevents", skip_serializing_if = "is_zero")]
    pub max_events: u64,
    #[serde(rename = "pagesize", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    pub include: Vec<String>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> MessageEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn classify_schema() {
        let msg = envelope(
            r#"{"schema":{"@id":"p/c/w/1","@window":"p/c/w","fields":[
                {"@key":"true","@name":"id","@type":"int64"}],"schema-string":"id*:int64"}}"#,
        )
        .classify();
        let Message::Schema(schema) = msg else {
            panic!("expected schema, got {}", msg.kind());
        };
        assert_eq!(schema.subscription_id, "p/c/w/1");
        assert_eq!(schema.fields[0].ty, "int64");
    }

    #[test]
    fn schema_wins_over_events() {
        let msg = envelope(
            r#"{"events":{"@id":"a","entries":[]},"schema":{"@id":"a","fields":[]}}"#,
        )
        .classify();
        assert!(matches!(msg, Message::Schema(_)));
    }

    #[test]
    fn classify_error_and_projects() {
        assert!(matches!(
            envelope(r#"{"error":{"text":"boom"}}"#).classify(),
            Message::Error(e) if e.text == "boom"
        ));
        assert!(matches!(
            envelope(r#"{"project-loaded":{"name":"p"}}"#).classify(),
            Message::ProjectLoaded(p) if p.name == "p"
        ));
        assert!(matches!(
            envelope(r#"{"project-removed":{"name":"p"}}"#).classify(),
            Message::ProjectRemoved(p) if p.name == "p"
        ));
    }

    #[test]
    fn classify_discard_info() {
        let msg = envelope(
            r#"{"info":{"type":"event_source_discard","data":{"discarded":3,"total":10}}}"#,
        )
        .classify();
        assert!(matches!(
            msg,
            Message::Discard(DiscardInfo { discarded: 3, total: 10 })
        ));
    }

    #[test]
    fn other_info_is_unknown() {
        let msg = envelope(r#"{"info":{"type":"heartbeat"}}"#).classify();
        assert!(matches!(msg, Message::Unknown));
        assert!(matches!(envelope("{}").classify(), Message::Unknown));
    }

    #[test]
    fn request_omits_zero_limits() {
        let req = SubscriptionRequest {
            event_stream: EventStreamRequest {
                action: "set".into(),
                id: "p/c/w/x".into(),
                window: "p/c/w".into(),
                schema: true,
                update_deletes: true,
                format: "cbor".into(),
                interval: 0,
                max_events: 25,
                page_size: None,
                include: vec!["a".into()],
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        let stream = &json["eventStream"];
        assert!(stream.get("interval").is_none());
        assert_eq!(stream["maxevents"], 25);
        assert_eq!(stream["update-deletes"], true);
        assert_eq!(stream["include"][0], "a");
    }
}
