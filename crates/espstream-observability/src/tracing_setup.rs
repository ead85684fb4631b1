//! Tracing / logging initialisation helpers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level, e.g. `espstream-client: debug`
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directives, e.g. `info,espstream_client=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter '{directives}': {reason}")]
    InvalidFilter { directives: String, reason: String },

    #[error("global subscriber already set: {0}")]
    AlreadySet(String),
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, TracingError> {
    // RUST_LOG wins over the file so a single run can be turned up.
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.directives();
    EnvFilter::try_new(&directives).map_err(|e| TracingError::InvalidFilter {
        directives,
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Call once at startup.
pub fn try_init_tracing(config: &LogConfig) -> Result<(), TracingError> {
    let filter = build_filter(config)?;
    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };
    result.map_err(|e| TracingError::AlreadySet(e.to_string()))
}

/// Like [`try_init_tracing`], falling back to `info` on a bad filter and
/// ignoring an already-installed subscriber.
pub fn init_tracing(config: &LogConfig) {
    let filter = build_filter(config).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_components() {
        let mut cfg = LogConfig::default();
        cfg.components.insert("espstream-client".into(), "debug".into());
        cfg.components.insert("espstream-core".into(), "trace".into());
        assert_eq!(
            cfg.directives(),
            "info,espstream_client=debug,espstream_core=trace"
        );
    }

    #[test]
    fn log_config_from_yaml() {
        let cfg: LogConfig = serde_yaml::from_str("level: warn\njson: true\n").unwrap();
        assert_eq!(cfg.level, "warn");
        assert!(cfg.json);
        assert!(cfg.components.is_empty());
    }
}
