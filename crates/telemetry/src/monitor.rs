//! Thread-safe latency monitor for context assembly.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use crate::TelemetryError;
use crate::model::{LatencySample, LatencySummary};

const DEFAULT_CAPACITY: usize = 1_000;

/// Keeps the most recent samples (oldest evicted first) and the
/// per-operation latency target.
pub struct PerformanceMonitor {
    target: Duration,
    capacity: usize,
    samples: RwLock<VecDeque<LatencySample>>,
}

impl PerformanceMonitor {
    pub fn new(target: Duration) -> Self {
        Self::with_capacity(target, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(target: Duration, capacity: usize) -> Self {
        Self {
            target,
            capacity: capacity.max(1),
            samples: RwLock::new(VecDeque::new()),
        }
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    /// Record a timing. Returns a warning message when the target was missed.
    pub fn record(&self, operation: &str, elapsed: Duration) -> Option<String> {
        let elapsed_ms = elapsed.as_millis() as u64;
        let over_target = elapsed > self.target;

        {
            let mut samples = self.samples.write().unwrap_or_else(|e| e.into_inner());
            if samples.len() >= self.capacity {
                samples.pop_front();
            }
            samples.push_back(LatencySample {
                operation: operation.to_string(),
                elapsed_ms,
                over_target,
                recorded_at: Utc::now(),
            });
        }

        if over_target {
            let message = format!(
                "{operation} took {elapsed_ms}ms (target {}ms)",
                self.target.as_millis()
            );
            tracing::warn!(operation, elapsed_ms, "Context assembly exceeded latency target");
            Some(message)
        } else {
            None
        }
    }

    /// Summary for one operation. `None` when nothing was recorded.
    pub fn summary(&self, operation: &str) -> Option<LatencySummary> {
        let samples = self.samples.read().unwrap_or_else(|e| e.into_inner());
        let mut durations: Vec<u64> = samples
            .iter()
            .filter(|s| s.operation == operation)
            .map(|s| s.elapsed_ms)
            .collect();
        if durations.is_empty() {
            return None;
        }
        let slow_count = samples
            .iter()
            .filter(|s| s.operation == operation && s.over_target)
            .count();

        durations.sort_unstable();
        let count = durations.len();
        let total: u64 = durations.iter().sum();
        Some(LatencySummary {
            operation: operation.to_string(),
            count,
            mean_ms: total as f64 / count as f64,
            p50_ms: percentile(&durations, 0.50),
            p95_ms: percentile(&durations, 0.95),
            max_ms: durations[count - 1],
            slow_count,
        })
    }

    /// Most recent samples first.
    pub fn recent(&self, limit: usize) -> Vec<LatencySample> {
        let samples = self.samples.read().unwrap_or_else(|e| e.into_inner());
        samples.iter().rev().take(limit).cloned().collect()
    }

    /// Retained samples as a JSON array, oldest first.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        let samples = self.samples.read().unwrap_or_else(|e| e.into_inner());
        Ok(serde_json::to_string(&*samples)?)
    }

    pub fn clear(&self) {
        self.samples
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Nearest-rank percentile over sorted input.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = ((p * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}
