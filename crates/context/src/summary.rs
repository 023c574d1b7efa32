//! Plain-text rendering of a bundle for prompt injection.

use std::fmt::Write;
use tiermind_core::{
    Severity, Tier, Tier1Context, Tier2Context, Tier3Context, TierOutcome,
};

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
        Severity::Critical => "CRITICAL",
    }
}

fn write_unavailable<T>(out: &mut String, tier: Tier, outcome: &TierOutcome<T>) {
    if let Some(reason) = outcome.failure_reason() {
        let _ = writeln!(out, "({tier} unavailable: {reason})");
    }
}

fn working_memory(out: &mut String, t1: &Tier1Context) {
    out.push_str("## Recent work\n");
    if let Some(active) = &t1.active_conversation {
        let _ = writeln!(
            out,
            "Active conversation: {} ({} turns)",
            active.title, active.turn_count
        );
    }
    for turn in &t1.active_turns {
        let _ = writeln!(out, "> {}: {}", turn.role.as_str(), turn.content);
    }
    if !t1.recent_conversations.is_empty() {
        let titles: Vec<&str> = t1
            .recent_conversations
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        let _ = writeln!(out, "Recent conversations: {}", titles.join("; "));
    }
    if !t1.entities.is_empty() {
        let names: Vec<String> = t1
            .entities
            .iter()
            .map(|e| format!("{} ({})", e.text, e.kind.as_str()))
            .collect();
        let _ = writeln!(out, "Mentioned: {}", names.join(", "));
    }
    for r in &t1.resolved_references {
        let _ = writeln!(out, "\"{}\" refers to {}", r.term, r.entity.text);
    }
}

fn knowledge(out: &mut String, t2: &Tier2Context) {
    if t2.patterns.is_empty() {
        return;
    }
    out.push_str("## Known patterns\n");
    if let Some(ns) = &t2.namespace {
        let _ = writeln!(out, "Namespace: {ns}");
    }
    for p in &t2.patterns {
        let _ = writeln!(
            out,
            "- {} [{}, confidence {:.2}]: {}",
            p.title,
            p.pattern_type.as_str(),
            p.confidence,
            p.content
        );
    }
}

fn intelligence(out: &mut String, t3: &Tier3Context) {
    out.push_str("## Codebase health\n");
    let _ = writeln!(
        out,
        "Velocity: {:.1} commits/day over {} days ({})",
        t3.velocity.avg_commits_per_day,
        t3.velocity.days,
        t3.trend_direction.as_str()
    );
    for w in &t3.file_warnings {
        let _ = writeln!(
            out,
            "Warning: {} is {} ({:.0}% churn)",
            w.file_path,
            w.stability.as_str(),
            w.churn_rate * 100.0
        );
    }
    if !t3.hotspots.is_empty() {
        let spots: Vec<String> = t3
            .hotspots
            .iter()
            .map(|h| format!("{} ({:.0}%)", h.file_path, h.churn_rate * 100.0))
            .collect();
        let _ = writeln!(out, "Hotspots: {}", spots.join(", "));
    }
    for i in &t3.insights {
        let _ = writeln!(out, "[{}] {}", severity_label(i.severity), i.title);
    }
}

/// Render the available tiers as markdown-ish text, noting tiers that
/// failed. Excluded tiers are left out silently.
pub fn render_summary(
    tier1: &TierOutcome<Tier1Context>,
    tier2: &TierOutcome<Tier2Context>,
    tier3: &TierOutcome<Tier3Context>,
) -> String {
    let mut out = String::new();

    match tier1 {
        TierOutcome::Available(t1) => working_memory(&mut out, t1),
        other => write_unavailable(&mut out, Tier::WorkingMemory, other),
    }
    match tier2 {
        TierOutcome::Available(t2) => knowledge(&mut out, t2),
        other => write_unavailable(&mut out, Tier::KnowledgeGraph, other),
    }
    match tier3 {
        TierOutcome::Available(t3) => intelligence(&mut out, t3),
        other => write_unavailable(&mut out, Tier::ContextIntelligence, other),
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiermind_core::{TrendDirection, Velocity};

    #[test]
    fn failed_tiers_are_noted_and_excluded_are_silent() {
        let t1: TierOutcome<Tier1Context> = TierOutcome::Excluded;
        let t2: TierOutcome<Tier2Context> = TierOutcome::TimedOut { after_ms: 150 };
        let t3 = TierOutcome::Available(Tier3Context {
            velocity: Velocity {
                days: 30,
                avg_commits_per_day: 2.5,
                ..Velocity::default()
            },
            trend_direction: TrendDirection::Increasing,
            hotspots: vec![],
            file_warnings: vec![],
            insights: vec![],
        });

        let text = render_summary(&t1, &t2, &t3);
        assert!(!text.contains("tier1"));
        assert!(text.contains("tier2 unavailable: timed out after 150ms"));
        assert!(text.contains("Velocity: 2.5 commits/day over 30 days (increasing)"));
    }
}
