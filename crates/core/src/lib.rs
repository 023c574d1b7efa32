//! # Tiermind Core
//!
//! Domain types, traits and error definitions shared by the three memory
//! tiers and the context engine that merges them.
//!
//! - Tier 1 (working memory): [`Conversation`], [`Turn`], [`Entity`]
//! - Tier 2 (knowledge graph): [`Pattern`], [`NewPattern`], [`SearchOptions`]
//! - Tier 3 (context intelligence): [`GitMetric`], [`FileHotspot`], [`Insight`]
//! - Cross-tier: [`ContextBundle`], [`InjectRequest`], [`InjectedContext`]
//!
//! Storage and analysis live in the tier crates; everything here is plain
//! data plus the [`Clock`] and [`ContextConsumer`] seams.

pub mod clock;
pub mod context;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod pattern;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use context::{
    ContextBundle, ContextConsumer, ConversationSummary, DropInfo, IncludeTiers, InjectRequest,
    InjectedContext, ResolvedReference, Tier, Tier1Context, Tier2Context, Tier3Context,
    TierNotice, TierOutcome, TokenUsage,
};
pub use conversation::{
    Conversation, Entity, EntityKind, ImportResult, Role, Turn, TurnInput, parse_turns,
};
pub use error::{Error, Result, StorageError};
pub use metrics::{
    BuildMetric, FileHotspot, GitMetric, Insight, InsightType, Severity, Stability, TestMetric,
    Trend, TrendDirection, TrendReport, Velocity,
};
pub use pattern::{NewPattern, Pattern, PatternScope, PatternType, SearchOptions};
