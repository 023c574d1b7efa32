//! SQLite-backed pattern store with FTS5 search.
//!
//! Uses one table plus an external-content FTS5 index over (title, content):
//! - `patterns` — the pattern rows, with an integer rowid alias for FTS sync
//! - `patterns_fts` — BM25-ranked keyword index kept in sync by triggers

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tiermind_config::KnowledgeConfig;
use tiermind_core::{
    Error, NewPattern, Pattern, PatternScope, Result, SearchOptions, SharedClock,
};
use tiermind_storage::{
    FtsMode, Migration, SqlxResultExt, TierStore, format_ts, map_sqlx_error, parse_ts,
    sanitize_fts_query,
};
use tracing::{debug, info};

use crate::decay::{DecayParams, decayed_confidence, reinforced_confidence};

const MIGRATIONS: &[Migration] = &[
    Migration::new(
        "patterns",
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            iid          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT UNIQUE NOT NULL,
            title        TEXT NOT NULL,
            content      TEXT NOT NULL,
            pattern_type TEXT NOT NULL,
            confidence   REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            scope        TEXT NOT NULL DEFAULT 'generic'
                         CHECK (scope IN ('generic', 'application')),
            namespace    TEXT,
            usage_count  INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL,
            last_used_at TEXT NOT NULL,
            archived     INTEGER NOT NULL DEFAULT 0,
            metadata     TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    ),
    Migration::new(
        "patterns_fts",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS patterns_fts USING fts5(
            title,
            content,
            content='patterns',
            content_rowid='iid',
            tokenize='porter unicode61'
        )
        "#,
    ),
    Migration::new(
        "patterns_ai",
        r#"
        CREATE TRIGGER IF NOT EXISTS patterns_ai AFTER INSERT ON patterns BEGIN
            INSERT INTO patterns_fts(rowid, title, content)
            VALUES (new.iid, new.title, new.content);
        END
        "#,
    ),
    Migration::new(
        "patterns_ad",
        r#"
        CREATE TRIGGER IF NOT EXISTS patterns_ad AFTER DELETE ON patterns BEGIN
            INSERT INTO patterns_fts(patterns_fts, rowid, title, content)
            VALUES ('delete', old.iid, old.title, old.content);
        END
        "#,
    ),
    Migration::new(
        "patterns_au",
        r#"
        CREATE TRIGGER IF NOT EXISTS patterns_au AFTER UPDATE OF title, content ON patterns BEGIN
            INSERT INTO patterns_fts(patterns_fts, rowid, title, content)
            VALUES ('delete', old.iid, old.title, old.content);
            INSERT INTO patterns_fts(rowid, title, content)
            VALUES (new.iid, new.title, new.content);
        END
        "#,
    ),
    Migration::new(
        "patterns_namespace_idx",
        "CREATE INDEX IF NOT EXISTS idx_patterns_namespace ON patterns(namespace)",
    ),
];

/// BM25 candidates fetched per requested result, before blending.
const CANDIDATE_FACTOR: usize = 5;
const MIN_CANDIDATES: usize = 50;

/// Tier 2 handle.
pub struct KnowledgeGraph {
    store: TierStore,
    config: KnowledgeConfig,
    decay: DecayParams,
    clock: SharedClock,
}

impl KnowledgeGraph {
    /// Wrap a tier store, creating the schema if needed.
    pub async fn new(store: TierStore, config: KnowledgeConfig, clock: SharedClock) -> Result<Self> {
        store.migrate(MIGRATIONS).await?;
        let decay = DecayParams::from(&config);
        Ok(Self {
            store,
            config,
            decay,
            clock,
        })
    }

    pub fn store(&self) -> &TierStore {
        &self.store
    }

    /// Insert a new pattern. Duplicate ids are a conflict.
    pub async fn store_pattern(&self, pattern: NewPattern) -> Result<String> {
        validate(&pattern)?;

        let now = format_ts(self.clock.now());
        let metadata = serde_json::to_string(&pattern.metadata.unwrap_or_default())?;

        sqlx::query(
            r#"
            INSERT INTO patterns
                (id, title, content, pattern_type, confidence, scope, namespace,
                 usage_count, created_at, last_used_at, archived, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, 0, ?9)
            "#,
        )
        .bind(&pattern.id)
        .bind(pattern.title.trim())
        .bind(&pattern.content)
        .bind(pattern.pattern_type.as_str())
        .bind(pattern.confidence as f64)
        .bind(pattern.scope.as_str())
        .bind(pattern.namespace.as_deref())
        .bind(&now)
        .bind(&metadata)
        .execute(self.store.pool())
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                Error::Conflict(format!("Pattern '{}' already exists", pattern.id))
            } else {
                map_sqlx_error("insert pattern", e)
            }
        })?;

        debug!(pattern_id = %pattern.id, "Pattern stored");
        Ok(pattern.id)
    }

    /// Load a pattern with its confidence decayed to now.
    pub async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        let row = sqlx::query("SELECT * FROM patterns WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.store.pool())
            .await
            .storage_err("load pattern")?;

        row.as_ref().map(|r| self.row_to_pattern(r)).transpose()
    }

    /// Keyword search with an optional scope filter.
    pub async fn search_patterns(
        &self,
        query: &str,
        scope: Option<PatternScope>,
        limit: usize,
    ) -> Result<Vec<Pattern>> {
        self.search(&SearchOptions {
            query: query.to_string(),
            scope,
            namespace_hint: None,
            limit,
        })
        .await
    }

    /// Rank active patterns by blended relevance and decayed confidence.
    pub async fn search(&self, options: &SearchOptions) -> Result<Vec<Pattern>> {
        let fts_query = sanitize_fts_query(&options.query, FtsMode::Any);
        if fts_query.is_empty() || options.limit == 0 {
            return Ok(vec![]);
        }

        let scope_filter = if options.scope.is_some() {
            "AND p.scope = ?3"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT p.*, bm25(patterns_fts) AS rank
            FROM patterns_fts f
            JOIN patterns p ON p.iid = f.rowid
            WHERE patterns_fts MATCH ?1
              AND p.archived = 0
              {scope_filter}
            ORDER BY rank
            LIMIT ?2
            "#
        );

        let candidates = (options.limit * CANDIDATE_FACTOR).max(MIN_CANDIDATES);
        let mut db_query = sqlx::query(&sql).bind(&fts_query).bind(candidates as i64);
        if let Some(scope) = options.scope {
            db_query = db_query.bind(scope.as_str());
        }

        let rows = db_query
            .fetch_all(self.store.pool())
            .await
            .storage_err("FTS5 pattern search")?;

        // bm25() is negative, lower is better
        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let rank: f64 = row.try_get("rank").storage_err("read search rank")?;
            hits.push((self.row_to_pattern(row)?, (-rank).max(0.0)));
        }
        let best = hits.iter().map(|(_, r)| *r).fold(0.0f64, f64::max);

        let mut results: Vec<Pattern> = hits
            .into_iter()
            .map(|(mut pattern, raw)| {
                let relevance = if best > 0.0 { (raw / best) as f32 } else { 1.0 };
                let mut score = self.config.relevance_weight * relevance
                    + self.config.confidence_weight * pattern.confidence;
                if options.namespace_hint.is_some()
                    && pattern.namespace.as_deref() == options.namespace_hint.as_deref()
                {
                    score *= self.config.namespace_boost;
                }
                pattern.score = score;
                pattern
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(options.limit);
        debug!(query = %options.query, hits = results.len(), "Pattern search");
        Ok(results)
    }

    /// Record a successful reuse: confidence moves toward 1.0 from its
    /// decayed value, usage count increments, last use becomes now.
    pub async fn reinforce(&self, id: &str) -> Result<Option<Pattern>> {
        let Some(current) = self.get_pattern(id).await? else {
            return Ok(None);
        };

        let confidence = reinforced_confidence(current.confidence, self.config.reinforcement_boost);
        sqlx::query(
            r#"
            UPDATE patterns
            SET confidence = ?2, usage_count = usage_count + 1, last_used_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(confidence as f64)
        .bind(format_ts(self.clock.now()))
        .execute(self.store.pool())
        .await
        .storage_err("reinforce pattern")?;

        debug!(pattern_id = %id, confidence, "Pattern reinforced");
        self.get_pattern(id).await
    }

    /// Hide a pattern from search. Returns whether it existed.
    pub async fn archive_pattern(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE patterns SET archived = 1 WHERE id = ?1")
            .bind(id)
            .execute(self.store.pool())
            .await
            .storage_err("archive pattern")?;
        Ok(result.rows_affected() > 0)
    }

    /// Archive every active pattern whose decayed confidence is below
    /// `min_confidence`. Returns how many were archived.
    pub async fn archive_stale(&self, min_confidence: f32) -> Result<usize> {
        let rows = sqlx::query("SELECT * FROM patterns WHERE archived = 0")
            .fetch_all(self.store.pool())
            .await
            .storage_err("scan active patterns")?;

        let mut stale = Vec::new();
        for row in &rows {
            let pattern = self.row_to_pattern(row)?;
            if pattern.confidence < min_confidence {
                stale.push(pattern.id);
            }
        }

        for id in &stale {
            self.archive_pattern(id).await?;
        }
        if !stale.is_empty() {
            info!(archived = stale.len(), min_confidence, "Archived stale patterns");
        }
        Ok(stale.len())
    }

    /// Number of active (non-archived) patterns.
    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patterns WHERE archived = 0")
            .fetch_one(self.store.pool())
            .await
            .storage_err("count patterns")?;
        Ok(count as usize)
    }

    fn row_to_pattern(&self, row: &SqliteRow) -> Result<Pattern> {
        let stored_confidence = row.get::<f64, _>("confidence") as f32;
        let usage_count = row.get::<i64, _>("usage_count").max(0) as u32;
        let last_used_at = parse_ts(&row.get::<String, _>("last_used_at"))?;
        let metadata: String = row.get("metadata");

        Ok(Pattern {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            pattern_type: row.get::<String, _>("pattern_type").parse()?,
            confidence: decayed_confidence(
                stored_confidence,
                last_used_at,
                usage_count,
                self.clock.now(),
                &self.decay,
            ),
            stored_confidence,
            scope: row.get::<String, _>("scope").parse()?,
            namespace: row.get("namespace"),
            usage_count,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            last_used_at,
            archived: row.get::<i64, _>("archived") != 0,
            metadata: serde_json::from_str(&metadata)?,
            score: 0.0,
        })
    }
}

fn validate(pattern: &NewPattern) -> Result<()> {
    if pattern.id.trim().is_empty() {
        return Err(Error::validation("Pattern id must not be empty"));
    }
    if pattern.title.trim().is_empty() {
        return Err(Error::validation("Pattern title must not be empty"));
    }
    if !(0.0..=1.0).contains(&pattern.confidence) {
        return Err(Error::validation(format!(
            "Pattern confidence {} is outside [0, 1]",
            pattern.confidence
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tiermind_core::{Clock, ManualClock, PatternType};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    async fn graph() -> (KnowledgeGraph, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(start()));
        let store = TierStore::in_memory("tier2").await.unwrap();
        let graph = KnowledgeGraph::new(store, KnowledgeConfig::default(), clock.clone())
            .await
            .unwrap();
        (graph, clock)
    }

    fn auth_flow() -> NewPattern {
        NewPattern::new(
            "auth-flow",
            "auth-flow",
            "Validate the session token, then refresh it before it expires",
            PatternType::Workflow,
            0.95,
        )
    }

    #[tokio::test]
    async fn store_and_get() {
        let (graph, _) = graph().await;
        let id = graph.store_pattern(auth_flow()).await.unwrap();
        assert_eq!(id, "auth-flow");

        let pattern = graph.get_pattern("auth-flow").await.unwrap().unwrap();
        assert_eq!(pattern.pattern_type, PatternType::Workflow);
        assert_eq!(pattern.usage_count, 0);
        assert!((pattern.confidence - 0.95).abs() < 1e-6);
        assert!(graph.get_pattern("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_an_error() {
        let (graph, _) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        sqlx::query("UPDATE patterns SET metadata = 'not json' WHERE id = 'auth-flow'")
            .execute(graph.store().pool())
            .await
            .unwrap();

        let err = graph.get_pattern("auth-flow").await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn duplicate_id_is_conflict() {
        let (graph, _) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        let err = graph.store_pattern(auth_flow()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_patterns_are_rejected() {
        let (graph, _) = graph().await;
        let mut bad = auth_flow();
        bad.confidence = 1.5;
        assert!(matches!(
            graph.store_pattern(bad).await,
            Err(Error::Validation(_))
        ));

        let mut untitled = auth_flow();
        untitled.title = "  ".into();
        assert!(matches!(
            graph.store_pattern(untitled).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(graph.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let (graph, _) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        assert!(graph.search_patterns("", None, 10).await.unwrap().is_empty());
        assert!(graph.search_patterns("   ", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decayed_pattern_is_still_found_with_lower_confidence() {
        let (graph, clock) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        clock.advance(Duration::days(30));

        let results = graph.search_patterns("auth", None, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        let confidence = results[0].confidence;
        assert!((0.0..0.95).contains(&confidence));
        assert!((results[0].stored_confidence - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn relevance_and_confidence_are_blended() {
        let (graph, _) = graph().await;
        graph
            .store_pattern(NewPattern::new(
                "retry",
                "Retry flaky network calls",
                "Wrap network calls in exponential backoff",
                PatternType::Solution,
                0.3,
            ))
            .await
            .unwrap();
        graph
            .store_pattern(NewPattern::new(
                "timeouts",
                "Network timeouts",
                "Always set explicit network timeouts",
                PatternType::Preference,
                0.9,
            ))
            .await
            .unwrap();
        graph
            .store_pattern(NewPattern::new(
                "css",
                "Button colors",
                "Use theme variables for colors",
                PatternType::Preference,
                0.9,
            ))
            .await
            .unwrap();

        let results = graph.search_patterns("network", None, 10).await.unwrap();
        let ids: Vec<_> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"css"));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|p| p.score > 0.0));
    }

    #[tokio::test]
    async fn namespace_hint_boosts_matching_patterns() {
        let (graph, _) = graph().await;
        graph
            .store_pattern(
                NewPattern::new(
                    "ui-validate",
                    "Form validation",
                    "Validate form input on blur",
                    PatternType::Validation,
                    0.7,
                )
                .with_namespace("ui"),
            )
            .await
            .unwrap();
        graph
            .store_pattern(
                NewPattern::new(
                    "api-validate",
                    "Form validation",
                    "Validate form input on blur",
                    PatternType::Validation,
                    0.7,
                )
                .with_namespace("api"),
            )
            .await
            .unwrap();

        let mut options = SearchOptions::new("form validation");
        options.namespace_hint = Some("api".into());
        let results = graph.search(&options).await.unwrap();
        assert_eq!(results[0].id, "api-validate");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn scope_filter_applies() {
        let (graph, _) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        graph
            .store_pattern(
                NewPattern::new(
                    "auth-app",
                    "auth in this app",
                    "Tokens live in the HostSession service",
                    PatternType::Architecture,
                    0.8,
                )
                .with_scope(PatternScope::Application),
            )
            .await
            .unwrap();

        let app_only = graph
            .search_patterns("auth", Some(PatternScope::Application), 10)
            .await
            .unwrap();
        assert_eq!(app_only.len(), 1);
        assert_eq!(app_only[0].id, "auth-app");
    }

    #[tokio::test]
    async fn reinforce_raises_confidence_and_usage() {
        let (graph, clock) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        clock.advance(Duration::days(40));

        let decayed = graph.get_pattern("auth-flow").await.unwrap().unwrap();
        let reinforced = graph.reinforce("auth-flow").await.unwrap().unwrap();
        let expected = decayed.confidence + 0.1 * (1.0 - decayed.confidence);

        assert!((reinforced.confidence - expected).abs() < 1e-5);
        assert_eq!(reinforced.usage_count, 1);
        assert_eq!(reinforced.last_used_at, clock.now());
        assert!(graph.reinforce("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archived_patterns_leave_search() {
        let (graph, clock) = graph().await;
        graph.store_pattern(auth_flow()).await.unwrap();
        graph
            .store_pattern(NewPattern::new(
                "auth-weak",
                "auth guess",
                "Maybe cache auth headers",
                PatternType::Solution,
                0.2,
            ))
            .await
            .unwrap();
        clock.advance(Duration::days(60));

        assert_eq!(graph.archive_stale(0.3).await.unwrap(), 1);
        let results = graph.search_patterns("auth", None, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "auth-flow");
        assert_eq!(graph.count().await.unwrap(), 1);

        assert!(graph.archive_pattern("auth-flow").await.unwrap());
        assert!(graph.search_patterns("auth", None, 10).await.unwrap().is_empty());
        assert!(!graph.archive_pattern("missing").await.unwrap());
    }
}
