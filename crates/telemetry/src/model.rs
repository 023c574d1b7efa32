//! Latency data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    /// e.g. "inject_context", "tier2"
    pub operation: String,
    pub elapsed_ms: u64,
    pub over_target: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate view over the retained samples of one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub operation: String,
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    /// Samples that missed the target
    pub slow_count: usize,
}

impl LatencySummary {
    /// Share of samples that missed the target.
    pub fn slow_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.slow_count as f64 / self.count as f64
        }
    }
}
