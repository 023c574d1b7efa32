//! Storage engine shared by the three tiers.
//!
//! Each tier owns one SQLite database opened through [`TierStore`]:
//! WAL journal, `foreign_keys = ON`, a busy timeout and an idempotent
//! migration list. The helpers here keep SQL error mapping, timestamp
//! encoding and FTS5 query sanitizing identical across tiers.

pub mod error;
pub mod fts;
pub mod store;
pub mod time;

pub use error::{SqlxResultExt, map_sqlx_error};
pub use fts::{FtsMode, sanitize_fts_query};
pub use store::{Migration, StoreOptions, TierStore};
pub use time::{format_date, format_ts, parse_date, parse_ts};
