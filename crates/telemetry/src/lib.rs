//! Logging setup and latency tracking for tiermind.
//!
//! [`init_logging`] installs the process-wide `tracing` subscriber.
//! [`PerformanceMonitor`] keeps a bounded window of context-assembly
//! latencies so callers can see how often the interactive target is missed.

pub mod logging;
pub mod model;
pub mod monitor;

pub use logging::{build_filter, init_logging};
pub use model::{LatencySample, LatencySummary};
pub use monitor::PerformanceMonitor;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
