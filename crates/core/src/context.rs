//! Cross-tier context types: per-tier payloads, the merged bundle, the
//! `inject_context` request/response pair and the consumer extension point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::conversation::{Entity, Turn};
use crate::metrics::{FileHotspot, Insight, TrendDirection, Velocity};
use crate::pattern::Pattern;

/// One of the three memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[serde(rename = "tier1")]
    WorkingMemory,
    #[serde(rename = "tier2")]
    KnowledgeGraph,
    #[serde(rename = "tier3")]
    ContextIntelligence,
}

impl Tier {
    pub const ALL: [Tier; 3] = [
        Tier::WorkingMemory,
        Tier::KnowledgeGraph,
        Tier::ContextIntelligence,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::WorkingMemory => "tier1",
            Self::KnowledgeGraph => "tier2",
            Self::ContextIntelligence => "tier3",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a tier contributed to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum TierOutcome<T> {
    Available(T),
    Unavailable { reason: String },
    TimedOut { after_ms: u64 },
    /// Left out by the caller's tier selection
    Excluded,
}

impl<T> TierOutcome<T> {
    pub fn as_available(&self) -> Option<&T> {
        match self {
            Self::Available(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_available(self) -> Option<T> {
        match self {
            Self::Available(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Human-readable reason the tier is missing, if it is.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Available(_) | Self::Excluded => None,
            Self::Unavailable { reason } => Some(reason.clone()),
            Self::TimedOut { after_ms } => Some(format!("timed out after {after_ms}ms")),
        }
    }
}

/// Compact view of a conversation for context payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub quality_score: f32,
    pub turn_count: usize,
}

/// A deictic term in the request and the entity it refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub term: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tier1Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_conversation: Option<ConversationSummary>,
    /// Trailing turns of the active conversation, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_turns: Vec<Turn>,
    /// Most recent first
    pub recent_conversations: Vec<ConversationSummary>,
    /// Most recent first
    pub entities: Vec<Entity>,
    pub resolved_references: Vec<ResolvedReference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tier2Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Highest score first
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier3Context {
    pub velocity: Velocity,
    pub trend_direction: TrendDirection,
    /// Unstable hotspots, highest churn first
    pub hotspots: Vec<FileHotspot>,
    /// Hotspot records for the caller's current files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_warnings: Vec<FileHotspot>,
    /// Most severe first
    pub insights: Vec<Insight>,
}

/// Token accounting for a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub budget: usize,
    pub used: usize,
    pub per_tier: HashMap<Tier, usize>,
    pub summary: usize,
}

/// Items dropped from a tier to fit the budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub tier: Tier,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

/// The merged, budgeted output of `build_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub tier1: TierOutcome<Tier1Context>,
    pub tier2: TierOutcome<Tier2Context>,
    pub tier3: TierOutcome<Tier3Context>,
    pub merged_summary: String,
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drops: Vec<DropInfo>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_warning: Option<String>,
}

/// Per-tier inclusion switches. Tiers missing from the map are included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncludeTiers(pub HashMap<Tier, bool>);

impl IncludeTiers {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn includes(&self, tier: Tier) -> bool {
        self.0.get(&tier).copied().unwrap_or(true)
    }

    pub fn set(mut self, tier: Tier, include: bool) -> Self {
        self.0.insert(tier, include);
        self
    }
}

/// Request for the primary external entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectRequest {
    pub user_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default)]
    pub include_tiers: IncludeTiers,
}

impl InjectRequest {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            conversation_id: None,
            current_file: None,
            include_tiers: IncludeTiers::all(),
        }
    }
}

/// A tier that could not contribute to an injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierNotice {
    pub tier: Tier,
    pub reason: String,
}

/// Response of `inject_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier1: Option<Tier1Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier2: Option<Tier2Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier3: Option<Tier3Context>,
    pub merged_summary: String,
    pub injection_time_ms: u64,
    pub performance_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<TierNotice>,
}

/// Something outside the core that reacts to injected context
/// (prompt builders, story generators, audit sinks).
pub trait ContextConsumer: Send + Sync {
    fn name(&self) -> &str;

    fn on_context(&self, request: &InjectRequest, context: &InjectedContext);
}
