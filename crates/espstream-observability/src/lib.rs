//! # espstream-observability
//!
//! Logging setup for ESPStream binaries and a structured summary of a
//! client's counters.
//!
//! Log levels are configurable per component; output is either
//! human-readable or JSON lines.

pub mod stats;
pub mod tracing_setup;

pub use stats::{drop_ratio, log_stats};
pub use tracing_setup::{init_tracing, try_init_tracing, LogConfig, TracingError};
