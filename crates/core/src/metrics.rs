//! Context-intelligence domain types: git metrics, hotspots, velocity,
//! trends and insights.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Aggregated git activity for one day (optionally one contributor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitMetric {
    pub date: NaiveDate,
    pub commits_count: u32,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub net_growth: i64,
    pub files_changed: u32,
    /// `None` for the all-contributors aggregate row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
}

/// Qualitative stability bucket derived from churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stability {
    Stable,
    Moderate,
    Unstable,
}

impl Stability {
    /// Classify a churn rate. `low` and `high` are the STABLE/MODERATE and
    /// MODERATE/UNSTABLE boundaries.
    pub fn classify(churn_rate: f64, low: f64, high: f64) -> Self {
        if churn_rate < low {
            Self::Stable
        } else if churn_rate < high {
            Self::Moderate
        } else {
            Self::Unstable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Moderate => "MODERATE",
            Self::Unstable => "UNSTABLE",
        }
    }
}

impl FromStr for Stability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STABLE" => Ok(Self::Stable),
            "MODERATE" => Ok(Self::Moderate),
            "UNSTABLE" => Ok(Self::Unstable),
            other => Err(Error::validation(format!("Unknown stability: {other}"))),
        }
    }
}

/// Churn analysis of one file over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHotspot {
    pub file_path: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_commits: u32,
    pub file_edits: u32,
    pub churn_rate: f64,
    pub stability: Stability,
    pub lines_changed: u64,
}

/// Test-suite results for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetric {
    pub date: NaiveDate,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

/// Build outcomes for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetric {
    pub date: NaiveDate,
    pub builds: u32,
    pub successes: u32,
    pub failures: u32,
    #[serde(default)]
    pub avg_duration_ms: u64,
}

/// Averages over a window. Per-day values divide by calendar days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub days: u32,
    pub avg_commits_per_day: f64,
    pub avg_lines_added: f64,
    pub avg_lines_deleted: f64,
    pub avg_net_growth: f64,
    pub avg_files_changed: f64,
    pub total_commits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

/// Comparison of the recent half of a window against the prior half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub recent_avg_commits: f64,
    pub prior_avg_commits: f64,
    /// Relative change `(recent - prior) / prior`; 1.0 when the prior half
    /// was empty and the recent one was not
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub velocity: Velocity,
    pub trend: Trend,
    pub trend_direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightType {
    VelocityDrop,
    FileHotspot,
    TestRegression,
    BuildInstability,
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// An actionable observation derived from tier-3 metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
