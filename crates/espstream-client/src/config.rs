//! Client configuration and server address handling.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::dispatch::DEFAULT_MAX_BULK_DEPTH;
use crate::error::ClientError;

/// Connection-level settings for one [`crate::EspClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full WebSocket URL of the connect endpoint
    pub url: String,
    /// Sent verbatim as the `Authorization` header on the upgrade request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    /// Deepest bulk nesting that is still unpacked
    #[serde(default = "default_max_bulk_depth")]
    pub max_bulk_depth: usize,
    /// Socket events buffered ahead of the inbound task
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

fn default_max_bulk_depth() -> usize { DEFAULT_MAX_BULK_DEPTH }
fn default_inbound_capacity() -> usize { 64 }

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authorization: None,
            max_bulk_depth: default_max_bulk_depth(),
            inbound_capacity: default_inbound_capacity(),
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_max_bulk_depth(mut self, depth: usize) -> Self {
        self.max_bulk_depth = depth;
        self
    }
}

/// Where the server lives. Renders the connect URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    #[serde(default)]
    pub tls: bool,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Base path the service is mounted under, without leading slash
    #[serde(default)]
    pub base_path: String,
}

impl ServerAddress {
    /// Path of the event stream endpoint below the base path.
    pub const CONNECT_PATH: &'static str = "eventStreamProcessing/v2/connect";

    pub fn new(tls: bool, host: impl Into<String>, port: Option<u16>, base_path: &str) -> Self {
        Self {
            tls,
            host: host.into(),
            port,
            base_path: base_path.trim_matches('/').to_string(),
        }
    }

    /// Parse `ws[s]://host[:port][/base]`. `wss` and `https` select TLS.
    pub fn from_url(s: &str) -> Result<Self, ClientError> {
        let url = Url::parse(s)?;
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidAddress(format!("{s}: missing host")))?;
        let tls = matches!(url.scheme(), "wss" | "https");
        Ok(Self::new(tls, host, url.port(), url.path()))
    }

    /// `ws[s]://host[:port]/[base/]eventStreamProcessing/v2/connect`
    pub fn connect_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        let authority = match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        };
        if self.base_path.is_empty() {
            format!("{scheme}://{authority}/{}", Self::CONNECT_PATH)
        } else {
            format!("{scheme}://{authority}/{}/{}", self.base_path, Self::CONNECT_PATH)
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_url())
    }
}

/// One window to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub project: String,
    #[serde(alias = "continuous_query")]
    pub cq: String,
    pub window: String,
    /// Server-side batching interval; 0 leaves it to the server
    #[serde(default)]
    pub interval: u64,
    /// Cap on events per batch; 0 leaves it to the server
    #[serde(default)]
    pub max_events: u64,
    /// Fields to include; empty means all
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SubscriptionConfig {
    pub fn new(project: impl Into<String>, cq: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            cq: cq.into(),
            window: window.into(),
            interval: 0,
            max_events: 0,
            fields: vec![],
        }
    }
}
