//! Tier 1: working memory.
//!
//! Holds the most recent conversations (FIFO, default capacity 20) with
//! their turns and the entities mentioned in them, so that follow-up
//! requests like "make it purple" can be tied back to "the FAB button".

pub mod entities;
pub mod quality;
pub mod resolver;
pub mod store;

pub use entities::{EntityExtractor, EntityMention};
pub use quality::quality_score;
pub use resolver::{DeicticScanner, PhraseAnchor, RecencyWindow, kind_hint, resolve_reference};
pub use store::WorkingMemory;

/// File name of the tier database inside the data directory.
pub const DB_FILE: &str = "tier1-working-memory.db";
