//! Unified context manager for tiermind.
//!
//! Pulls working memory (Tier 1), matching patterns (Tier 2) and codebase
//! health (Tier 3) into one token-budgeted bundle for an AI agent. Tiers
//! fail independently: a locked database or a directory outside version
//! control removes that tier from the bundle, never the whole request.

pub mod budget;
pub mod engine;
pub mod summary;
pub mod token;

pub use budget::enforce_budget;
pub use engine::{BuildRequest, ContextEngine};
pub use summary::render_summary;
pub use token::{estimate_json_tokens, estimate_tokens};
