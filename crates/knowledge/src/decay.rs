//! Confidence decay and reinforcement.
//!
//! Decay is computed lazily at read time and never written back; only
//! reinforcement persists a new confidence.

use chrono::{DateTime, Utc};
use tiermind_config::KnowledgeConfig;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    /// Days of inactivity before decay starts
    pub window_days: f64,
    pub daily_rate: f64,
    /// Each use slows decay by this factor
    pub usage_dampening: f64,
}

impl From<&KnowledgeConfig> for DecayParams {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            window_days: config.decay_window_days,
            daily_rate: config.daily_decay_rate,
            usage_dampening: config.usage_dampening,
        }
    }
}

impl Default for DecayParams {
    fn default() -> Self {
        Self::from(&KnowledgeConfig::default())
    }
}

/// `c · exp(−rate · excess_days / (1 + dampening · usage))`, clamped to [0, 1].
pub fn decayed_confidence(
    stored: f32,
    last_used_at: DateTime<Utc>,
    usage_count: u32,
    now: DateTime<Utc>,
    params: &DecayParams,
) -> f32 {
    let stored = clamp_unit(stored);
    let elapsed_days = (now - last_used_at).num_seconds().max(0) as f64 / SECONDS_PER_DAY;
    let excess = elapsed_days - params.window_days;
    if excess <= 0.0 {
        return stored;
    }

    let dampening = 1.0 + params.usage_dampening * usage_count as f64;
    let factor = (-params.daily_rate * excess / dampening).exp();
    clamp_unit((stored as f64 * factor) as f32)
}

/// Move confidence toward 1.0 by `boost` of the remaining distance.
pub fn reinforced_confidence(current: f32, boost: f32) -> f32 {
    let current = clamp_unit(current);
    clamp_unit(current + boost * (1.0 - current))
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
