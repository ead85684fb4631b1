//! `espstream run` configuration file.
//!
//! ```yaml
//! client:
//!   url: ws://localhost:31415/eventStreamProcessing/v2/connect
//!   authorization: Bearer abc
//! subscriptions:
//!   - project: trades
//!     cq: cq1
//!     window: Filtered
//!     max_events: 100
//!     fields: [price, symbol]
//! log:
//!   level: info
//!   components:
//!     espstream-client: debug
//! ```

use anyhow::{Context, Result};
use espstream_client::{ClientConfig, SubscriptionConfig};
use espstream_observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

impl StreamConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        if config.subscriptions.is_empty() {
            anyhow::bail!("config has no subscriptions");
        }
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("invalid config '{}'", path.display()))
    }
}
