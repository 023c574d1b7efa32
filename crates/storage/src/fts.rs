//! FTS5 query sanitizing.
//!
//! User text is never passed to `MATCH` directly: every word is stripped to
//! alphanumerics, quoted and turned into a prefix term.

/// How the sanitized terms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsMode {
    /// Every term must match
    All,
    /// Any term may match; BM25 ranks documents matching more terms higher
    Any,
}

/// Build a safe FTS5 query. Returns an empty string when nothing usable
/// remains, which callers treat as "no results".
pub fn sanitize_fts_query(text: &str, mode: FtsMode) -> String {
    let terms: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"*", w.to_lowercase()))
        .collect();

    let separator = match mode {
        FtsMode::All => " ",
        FtsMode::Any => " OR ",
    };
    terms.join(separator)
}
