//! Token budget enforcement across the three tier payloads.
//!
//! Each available tier is measured as compact JSON. While the total is over
//! budget, items are dropped in a fixed order:
//!
//! 1. Tier 3 insights, lowest severity first
//! 2. Tier 3 hotspots (lowest churn first), then current-file warnings
//! 3. Tier 2 patterns, lowest score first
//! 4. Tier 1 recent conversations, oldest first
//! 5. Tier 1 entities, oldest first
//! 6. Tier 1 active turns, oldest first
//!
//! Resolved references are never dropped. If the bundle is still over
//! budget after every step, it is returned as is and `used > budget`.

use serde::Serialize;
use std::collections::HashMap;
use tiermind_core::{
    DropInfo, Tier, Tier1Context, Tier2Context, Tier3Context, TierOutcome, TokenUsage,
};

use crate::token::estimate_json_tokens;

struct Ledger {
    budget: usize,
    per_tier: HashMap<Tier, usize>,
    drops: Vec<DropInfo>,
}

impl Ledger {
    fn used(&self) -> usize {
        self.per_tier.values().sum()
    }

    fn over(&self) -> bool {
        self.used() > self.budget
    }

    /// Pop items from `data` until the ledger fits or `pop` runs dry.
    fn trim<T: Serialize>(
        &mut self,
        tier: Tier,
        data: &mut T,
        reason: &str,
        mut pop: impl FnMut(&mut T) -> bool,
    ) {
        let mut items = 0;
        let mut tokens = 0;
        while self.over() {
            let before = estimate_json_tokens(data);
            if !pop(data) {
                break;
            }
            let after = estimate_json_tokens(data);
            self.per_tier.insert(tier, after);
            items += 1;
            tokens += before.saturating_sub(after);
        }
        if items > 0 {
            self.drops.push(DropInfo {
                tier,
                items_dropped: items,
                tokens_dropped: tokens,
                reason: reason.to_string(),
            });
        }
    }
}

fn measure<T: Serialize>(outcome: &TierOutcome<T>) -> usize {
    outcome.as_available().map(estimate_json_tokens).unwrap_or(0)
}

/// Trim the tiers in place to fit `budget` tokens.
pub fn enforce_budget(
    tier1: &mut TierOutcome<Tier1Context>,
    tier2: &mut TierOutcome<Tier2Context>,
    tier3: &mut TierOutcome<Tier3Context>,
    budget: usize,
) -> (TokenUsage, Vec<DropInfo>) {
    let mut ledger = Ledger {
        budget,
        per_tier: HashMap::from([
            (Tier::WorkingMemory, measure(tier1)),
            (Tier::KnowledgeGraph, measure(tier2)),
            (Tier::ContextIntelligence, measure(tier3)),
        ]),
        drops: Vec::new(),
    };

    if let TierOutcome::Available(t3) = tier3 {
        let tier = Tier::ContextIntelligence;
        ledger.trim(tier, t3, "lowest-severity insights", |t| t.insights.pop().is_some());
        ledger.trim(tier, t3, "lowest-churn hotspots", |t| t.hotspots.pop().is_some());
        ledger.trim(tier, t3, "current-file warnings", |t| t.file_warnings.pop().is_some());
    }

    if let TierOutcome::Available(t2) = tier2 {
        ledger.trim(Tier::KnowledgeGraph, t2, "lowest-score patterns", |t| {
            t.patterns.pop().is_some()
        });
    }

    if let TierOutcome::Available(t1) = tier1 {
        let tier = Tier::WorkingMemory;
        ledger.trim(tier, t1, "oldest recent conversations", |t| {
            t.recent_conversations.pop().is_some()
        });
        ledger.trim(tier, t1, "oldest entities", |t| t.entities.pop().is_some());
        ledger.trim(tier, t1, "oldest active turns", |t| {
            if t.active_turns.is_empty() {
                false
            } else {
                t.active_turns.remove(0);
                true
            }
        });
    }

    let usage = TokenUsage {
        budget,
        used: ledger.used(),
        per_tier: ledger.per_tier,
        summary: 0,
    };
    (usage, ledger.drops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tiermind_core::{
        ConversationSummary, Insight, InsightType, Severity, TrendDirection, Velocity,
    };

    fn insight(severity: Severity) -> Insight {
        Insight {
            insight_type: InsightType::VelocityDrop,
            severity,
            title: "x".repeat(200),
            description: String::new(),
            data: Default::default(),
            recommendations: vec!["r".into()],
            generated_at: Utc::now(),
        }
    }

    fn tier1(conversations: usize) -> Tier1Context {
        Tier1Context {
            recent_conversations: (0..conversations)
                .map(|i| ConversationSummary {
                    id: format!("c{i}"),
                    title: "y".repeat(200),
                    created_at: Utc::now(),
                    quality_score: 0.5,
                    turn_count: 2,
                })
                .collect(),
            ..Tier1Context::default()
        }
    }

    fn tier3(severities: &[Severity]) -> Tier3Context {
        Tier3Context {
            velocity: Velocity::default(),
            trend_direction: TrendDirection::Stable,
            hotspots: Vec::new(),
            file_warnings: Vec::new(),
            insights: severities.iter().copied().map(insight).collect(),
        }
    }

    #[test]
    fn under_budget_is_untouched() {
        let mut t1 = TierOutcome::Available(tier1(2));
        let mut t2 = TierOutcome::Excluded;
        let mut t3 = TierOutcome::Available(tier3(&[Severity::Info]));
        let (usage, drops) = enforce_budget(&mut t1, &mut t2, &mut t3, 100_000);
        assert!(drops.is_empty());
        assert!(usage.used <= usage.budget);
        assert_eq!(usage.per_tier[&Tier::KnowledgeGraph], 0);
    }

    #[test]
    fn tier3_is_trimmed_before_tier1() {
        let mut t1 = TierOutcome::Available(tier1(3));
        let mut t2: TierOutcome<Tier2Context> = TierOutcome::Excluded;
        let mut t3 = TierOutcome::Available(tier3(&[
            Severity::Critical,
            Severity::Warning,
            Severity::Info,
        ]));
        let t1_tokens = measure(&t1);
        let (usage, drops) = enforce_budget(&mut t1, &mut t2, &mut t3, t1_tokens + 80);

        assert!(usage.used <= usage.budget);
        assert_eq!(t1.as_available().unwrap().recent_conversations.len(), 3);
        assert_eq!(drops[0].tier, Tier::ContextIntelligence);
        assert!(drops.iter().all(|d| d.tier == Tier::ContextIntelligence));

        // The most severe insight is the last to go
        let left = &t3.as_available().unwrap().insights;
        assert!(left.len() < 3);
        if let Some(first) = left.first() {
            assert_eq!(first.severity, Severity::Critical);
        }
    }

    #[test]
    fn tiny_budget_reaches_tier1() {
        let mut t1 = TierOutcome::Available(tier1(3));
        let mut t2: TierOutcome<Tier2Context> = TierOutcome::Excluded;
        let mut t3 = TierOutcome::Available(tier3(&[Severity::Error]));
        let (usage, drops) = enforce_budget(&mut t1, &mut t2, &mut t3, 10);

        let tiers: Vec<Tier> = drops.iter().map(|d| d.tier).collect();
        let first_t1 = tiers.iter().position(|t| *t == Tier::WorkingMemory).unwrap();
        assert!(tiers[..first_t1].iter().all(|t| *t == Tier::ContextIntelligence));
        assert!(t1.as_available().unwrap().recent_conversations.is_empty());
        assert!(drops.iter().all(|d| d.items_dropped > 0));
        // Empty payload skeletons may still exceed a tiny budget
        assert!(usage.used >= usage.per_tier[&Tier::WorkingMemory]);
    }
}
