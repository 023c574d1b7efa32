//! Tier 2: knowledge graph.
//!
//! Long-lived patterns (workflows, fixes, preferences) ranked by FTS5
//! relevance blended with a confidence that decays while a pattern goes
//! unused and recovers when it is reinforced.

pub mod decay;
pub mod graph;
pub mod namespace;

pub use decay::{DecayParams, decayed_confidence, reinforced_confidence};
pub use graph::KnowledgeGraph;
pub use namespace::detect_namespace;

/// File name of the tier database inside the data directory.
pub const DB_FILE: &str = "tier2-knowledge-graph.db";
