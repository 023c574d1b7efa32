//! Insight generation from tier-3 metrics.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tiermind_config::IntelligenceConfig;
use tiermind_core::{
    BuildMetric, FileHotspot, Insight, InsightType, Severity, Stability, TestMetric,
    TrendDirection, TrendReport,
};

fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// A velocity insight when commits per day are trending down.
pub fn velocity_insight(
    report: &TrendReport,
    config: &IntelligenceConfig,
    now: DateTime<Utc>,
) -> Option<Insight> {
    if report.trend_direction != TrendDirection::Decreasing {
        return None;
    }
    let drop = -report.trend.change;
    let recent = report.trend.recent_avg_commits;

    let severity = if drop >= config.velocity_critical_drop && recent < config.velocity_critical_floor
    {
        Severity::Critical
    } else if drop >= config.velocity_error_drop {
        Severity::Error
    } else {
        Severity::Warning
    };

    let mut recommendations = vec![
        "Check whether work is blocked on reviews, dependencies or unclear requirements".to_string(),
        "Break large in-flight changes into smaller commits".to_string(),
    ];
    if severity >= Severity::Error {
        recommendations.push("Review team capacity and current priorities".to_string());
    }

    Some(Insight {
        insight_type: InsightType::VelocityDrop,
        severity,
        title: format!("Commit velocity down {:.0}%", drop * 100.0),
        description: format!(
            "Average commits per day fell from {:.2} to {:.2} over the last {} days",
            report.trend.prior_avg_commits, recent, report.velocity.days
        ),
        data: data(&[
            ("change", json!(report.trend.change)),
            ("recent_avg_commits", json!(recent)),
            ("prior_avg_commits", json!(report.trend.prior_avg_commits)),
            ("window_days", json!(report.velocity.days)),
        ]),
        recommendations,
        generated_at: now,
    })
}

/// Severity for an unstable file by churn rate.
pub fn hotspot_severity(churn_rate: f64, config: &IntelligenceConfig) -> Severity {
    if churn_rate >= config.hotspot_critical {
        Severity::Critical
    } else if churn_rate >= config.hotspot_error {
        Severity::Error
    } else if churn_rate >= config.hotspot_warning {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// One insight per UNSTABLE hotspot.
pub fn hotspot_insights(
    hotspots: &[FileHotspot],
    config: &IntelligenceConfig,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    hotspots
        .iter()
        .filter(|h| h.stability == Stability::Unstable)
        .map(|h| {
            let severity = hotspot_severity(h.churn_rate, config);
            let mut recommendations = vec![
                format!("Add or strengthen tests around {}", h.file_path),
                "Review recent changes to this file before editing it further".to_string(),
            ];
            if severity >= Severity::Error {
                recommendations
                    .push("Consider splitting the file to isolate frequently changing code".into());
            }
            Insight {
                insight_type: InsightType::FileHotspot,
                severity,
                title: format!("{} is a hotspot", h.file_path),
                description: format!(
                    "Touched by {} of {} commits ({:.0}% churn) between {} and {}",
                    h.file_edits,
                    h.total_commits,
                    h.churn_rate * 100.0,
                    h.period_start,
                    h.period_end
                ),
                data: data(&[
                    ("file_path", json!(h.file_path)),
                    ("churn_rate", json!(h.churn_rate)),
                    ("file_edits", json!(h.file_edits)),
                    ("total_commits", json!(h.total_commits)),
                    ("lines_changed", json!(h.lines_changed)),
                ]),
                recommendations,
                generated_at: now,
            }
        })
        .collect()
}

/// A regression insight when the window's pass rate is below threshold.
pub fn test_insight(
    metrics: &[TestMetric],
    config: &IntelligenceConfig,
    now: DateTime<Utc>,
) -> Option<Insight> {
    let total: u64 = metrics.iter().map(|m| u64::from(m.total)).sum();
    if total == 0 {
        return None;
    }
    let passed: u64 = metrics.iter().map(|m| u64::from(m.passed)).sum();
    let failed: u64 = metrics.iter().map(|m| u64::from(m.failed)).sum();
    let pass_rate = passed as f64 / total as f64;
    if pass_rate >= config.test_pass_threshold {
        return None;
    }

    let severity = if pass_rate < config.test_pass_threshold - 0.20 {
        Severity::Error
    } else {
        Severity::Warning
    };

    Some(Insight {
        insight_type: InsightType::TestRegression,
        severity,
        title: format!("Test pass rate at {:.0}%", pass_rate * 100.0),
        description: format!(
            "{failed} of {total} test runs failed across {} recorded days",
            metrics.len()
        ),
        data: data(&[
            ("pass_rate", json!(pass_rate)),
            ("passed", json!(passed)),
            ("failed", json!(failed)),
            ("total", json!(total)),
        ]),
        recommendations: vec![
            "Fix failing tests before adding new features".to_string(),
            "Quarantine flaky tests and track them separately".to_string(),
        ],
        generated_at: now,
    })
}

/// An instability insight when the window's build success rate is low.
pub fn build_insight(
    metrics: &[BuildMetric],
    config: &IntelligenceConfig,
    now: DateTime<Utc>,
) -> Option<Insight> {
    let builds: u64 = metrics.iter().map(|m| u64::from(m.builds)).sum();
    if builds == 0 {
        return None;
    }
    let successes: u64 = metrics.iter().map(|m| u64::from(m.successes)).sum();
    let rate = successes as f64 / builds as f64;
    if rate >= config.build_success_threshold {
        return None;
    }

    let severity = if rate < 0.5 {
        Severity::Error
    } else {
        Severity::Warning
    };

    Some(Insight {
        insight_type: InsightType::BuildInstability,
        severity,
        title: format!("Build success rate at {:.0}%", rate * 100.0),
        description: format!("{successes} of {builds} builds succeeded"),
        data: data(&[
            ("success_rate", json!(rate)),
            ("builds", json!(builds)),
            ("successes", json!(successes)),
        ]),
        recommendations: vec![
            "Investigate the most common build failure".to_string(),
            "Run the build locally before pushing".to_string(),
        ],
        generated_at: now,
    })
}

/// Every insight for a window, most severe first.
pub fn generate(
    report: &TrendReport,
    hotspots: &[FileHotspot],
    tests: &[TestMetric],
    builds: &[BuildMetric],
    config: &IntelligenceConfig,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    let mut insights = Vec::new();
    insights.extend(velocity_insight(report, config, now));
    insights.extend(hotspot_insights(hotspots, config, now));
    insights.extend(test_insight(tests, config, now));
    insights.extend(build_insight(builds, config, now));
    insights.sort_by(|a, b| b.severity.cmp(&a.severity));
    insights
}
