//! SQLite persistence for tier-3 metrics.
//!
//! Tables:
//! - `git_metrics` — one row per (date, contributor); `''` is the aggregate
//! - `file_hotspots` — churn per file per analysis window
//! - `test_metrics`, `build_metrics` — one row per day
//! - `collection_runs` — when each (kind, window) was last derived

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tiermind_core::{BuildMetric, FileHotspot, GitMetric, Result, TestMetric};
use tiermind_storage::{Migration, SqlxResultExt, TierStore, format_date, format_ts, parse_date, parse_ts};
use tracing::debug;

const MIGRATIONS: &[Migration] = &[
    Migration::new(
        "git_metrics",
        r#"
        CREATE TABLE IF NOT EXISTS git_metrics (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            date          TEXT NOT NULL,
            contributor   TEXT NOT NULL DEFAULT '',
            commits_count INTEGER NOT NULL,
            lines_added   INTEGER NOT NULL,
            lines_deleted INTEGER NOT NULL,
            net_growth    INTEGER NOT NULL,
            files_changed INTEGER NOT NULL,
            UNIQUE (date, contributor)
        )
        "#,
    ),
    Migration::new(
        "file_hotspots",
        r#"
        CREATE TABLE IF NOT EXISTS file_hotspots (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path     TEXT NOT NULL,
            period_start  TEXT NOT NULL,
            period_end    TEXT NOT NULL,
            total_commits INTEGER NOT NULL,
            file_edits    INTEGER NOT NULL,
            churn_rate    REAL NOT NULL CHECK (churn_rate >= 0.0 AND churn_rate <= 1.0),
            stability     TEXT NOT NULL CHECK (stability IN ('STABLE', 'MODERATE', 'UNSTABLE')),
            lines_changed INTEGER NOT NULL DEFAULT 0,
            UNIQUE (file_path, period_start, period_end)
        )
        "#,
    ),
    Migration::new(
        "file_hotspots_path_idx",
        "CREATE INDEX IF NOT EXISTS idx_hotspots_path ON file_hotspots(file_path, period_end)",
    ),
    Migration::new(
        "test_metrics",
        r#"
        CREATE TABLE IF NOT EXISTS test_metrics (
            date        TEXT PRIMARY KEY,
            total       INTEGER NOT NULL,
            passed      INTEGER NOT NULL,
            failed      INTEGER NOT NULL,
            skipped     INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            coverage    REAL CHECK (coverage IS NULL OR (coverage >= 0.0 AND coverage <= 1.0))
        )
        "#,
    ),
    Migration::new(
        "build_metrics",
        r#"
        CREATE TABLE IF NOT EXISTS build_metrics (
            date            TEXT PRIMARY KEY,
            builds          INTEGER NOT NULL,
            successes       INTEGER NOT NULL,
            failures        INTEGER NOT NULL,
            avg_duration_ms INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    Migration::new(
        "collection_runs",
        r#"
        CREATE TABLE IF NOT EXISTS collection_runs (
            kind         TEXT NOT NULL,
            window_days  INTEGER NOT NULL,
            collected_at TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end   TEXT NOT NULL,
            truncated    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (kind, window_days)
        )
        "#,
    ),
];

/// What a cached collection covered.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRun {
    pub collected_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub truncated: bool,
}

/// Which derived data set a collection run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    GitMetrics,
    Hotspots,
}

impl RunKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::GitMetrics => "git_metrics",
            Self::Hotspots => "file_hotspots",
        }
    }
}

pub struct MetricsStore {
    store: TierStore,
}

impl MetricsStore {
    pub async fn new(store: TierStore) -> Result<Self> {
        store.migrate(MIGRATIONS).await?;
        Ok(Self { store })
    }

    pub fn tier_store(&self) -> &TierStore {
        &self.store
    }

    // ── Git metrics ───────────────────────────────────────────────────

    /// Write daily rows for `[start, end]`.
    ///
    /// Existing rows for completed days are kept unless `force`; rows for
    /// `today` are always replaced.
    pub async fn write_git_metrics(
        &self,
        rows: &[GitMetric],
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
        force: bool,
    ) -> Result<()> {
        let mut tx = self.store.pool().begin().await.storage_err("begin git metrics")?;

        if force {
            sqlx::query("DELETE FROM git_metrics WHERE date >= ?1 AND date <= ?2")
                .bind(format_date(start))
                .bind(format_date(end))
                .execute(&mut *tx)
                .await
                .storage_err("clear git metrics")?;
        } else {
            sqlx::query("DELETE FROM git_metrics WHERE date = ?1")
                .bind(format_date(today))
                .execute(&mut *tx)
                .await
                .storage_err("clear today's git metrics")?;
        }

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO git_metrics
                    (date, contributor, commits_count, lines_added, lines_deleted,
                     net_growth, files_changed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (date, contributor) DO NOTHING
                "#,
            )
            .bind(format_date(row.date))
            .bind(row.contributor.as_deref().unwrap_or(""))
            .bind(i64::from(row.commits_count))
            .bind(row.lines_added as i64)
            .bind(row.lines_deleted as i64)
            .bind(row.net_growth)
            .bind(i64::from(row.files_changed))
            .execute(&mut *tx)
            .await
            .storage_err("insert git metric")?;
        }

        tx.commit().await.storage_err("commit git metrics")?;
        debug!(rows = rows.len(), force, "Git metrics written");
        Ok(())
    }

    /// Aggregate rows (`contributors = false`) or per-contributor rows for
    /// `[start, end]`, date ascending.
    pub async fn git_metrics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        contributors: bool,
    ) -> Result<Vec<GitMetric>> {
        let filter = if contributors {
            "contributor != ''"
        } else {
            "contributor = ''"
        };
        let sql = format!(
            "SELECT date, contributor, commits_count, lines_added, lines_deleted, net_growth, files_changed
             FROM git_metrics
             WHERE date >= ?1 AND date <= ?2 AND {filter}
             ORDER BY date ASC, contributor ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(format_date(start))
            .bind(format_date(end))
            .fetch_all(self.store.pool())
            .await
            .storage_err("load git metrics")?;
        rows.iter().map(row_to_git_metric).collect()
    }

    // ── Hotspots ──────────────────────────────────────────────────────

    /// Replace every hotspot whose period overlaps `[start, end]`, and
    /// forget the collection runs that produced them.
    pub async fn replace_hotspots(
        &self,
        hotspots: &[FileHotspot],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64> {
        let mut tx = self.store.pool().begin().await.storage_err("begin hotspots")?;

        let superseded =
            sqlx::query("DELETE FROM file_hotspots WHERE period_start <= ?2 AND period_end >= ?1")
                .bind(format_date(start))
                .bind(format_date(end))
                .execute(&mut *tx)
                .await
                .storage_err("clear hotspots")?
                .rows_affected();

        // Runs whose rows were just deleted no longer describe stored data
        sqlx::query(
            "DELETE FROM collection_runs
             WHERE kind = ?1 AND period_start <= ?3 AND period_end >= ?2",
        )
        .bind(RunKind::Hotspots.as_str())
        .bind(format_date(start))
        .bind(format_date(end))
        .execute(&mut *tx)
        .await
        .storage_err("invalidate hotspot runs")?;

        for h in hotspots {
            sqlx::query(
                r#"
                INSERT INTO file_hotspots
                    (file_path, period_start, period_end, total_commits, file_edits,
                     churn_rate, stability, lines_changed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&h.file_path)
            .bind(format_date(h.period_start))
            .bind(format_date(h.period_end))
            .bind(i64::from(h.total_commits))
            .bind(i64::from(h.file_edits))
            .bind(h.churn_rate)
            .bind(h.stability.as_str())
            .bind(h.lines_changed as i64)
            .execute(&mut *tx)
            .await
            .storage_err("insert hotspot")?;
        }

        tx.commit().await.storage_err("commit hotspots")?;
        debug!(inserted = hotspots.len(), superseded, "Hotspots replaced");
        Ok(superseded)
    }

    /// Hotspots stored for exactly `[start, end]`, churn descending.
    pub async fn hotspots(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<FileHotspot>> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, period_start, period_end, total_commits, file_edits,
                   churn_rate, stability, lines_changed
            FROM file_hotspots
            WHERE period_start = ?1 AND period_end = ?2
            ORDER BY churn_rate DESC, file_path ASC
            "#,
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(self.store.pool())
        .await
        .storage_err("load hotspots")?;
        rows.iter().map(row_to_hotspot).collect()
    }

    /// The most recent hotspot row for each of `paths` that has one.
    pub async fn latest_hotspots_for(&self, paths: &[String]) -> Result<Vec<FileHotspot>> {
        let mut found = Vec::new();
        for path in paths {
            let row = sqlx::query(
                r#"
                SELECT file_path, period_start, period_end, total_commits, file_edits,
                       churn_rate, stability, lines_changed
                FROM file_hotspots
                WHERE file_path = ?1
                ORDER BY period_end DESC, period_start DESC
                LIMIT 1
                "#,
            )
            .bind(path)
            .fetch_optional(self.store.pool())
            .await
            .storage_err("load file hotspot")?;
            if let Some(row) = row {
                found.push(row_to_hotspot(&row)?);
            }
        }
        Ok(found)
    }

    // ── Test and build metrics ────────────────────────────────────────

    pub async fn upsert_test_metric(&self, m: &TestMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO test_metrics (date, total, passed, failed, skipped, duration_ms, coverage)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (date) DO UPDATE SET
                total = excluded.total,
                passed = excluded.passed,
                failed = excluded.failed,
                skipped = excluded.skipped,
                duration_ms = excluded.duration_ms,
                coverage = excluded.coverage
            "#,
        )
        .bind(format_date(m.date))
        .bind(i64::from(m.total))
        .bind(i64::from(m.passed))
        .bind(i64::from(m.failed))
        .bind(i64::from(m.skipped))
        .bind(m.duration_ms as i64)
        .bind(m.coverage)
        .execute(self.store.pool())
        .await
        .storage_err("record test metric")?;
        Ok(())
    }

    pub async fn test_metrics(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<TestMetric>> {
        let rows = sqlx::query(
            "SELECT date, total, passed, failed, skipped, duration_ms, coverage
             FROM test_metrics WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(self.store.pool())
        .await
        .storage_err("load test metrics")?;

        rows.iter()
            .map(|row| {
                Ok(TestMetric {
                    date: parse_date(&row.get::<String, _>("date"))?,
                    total: row.get::<i64, _>("total") as u32,
                    passed: row.get::<i64, _>("passed") as u32,
                    failed: row.get::<i64, _>("failed") as u32,
                    skipped: row.get::<i64, _>("skipped") as u32,
                    duration_ms: row.get::<i64, _>("duration_ms") as u64,
                    coverage: row.get::<Option<f64>, _>("coverage"),
                })
            })
            .collect()
    }

    pub async fn upsert_build_metric(&self, m: &BuildMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO build_metrics (date, builds, successes, failures, avg_duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (date) DO UPDATE SET
                builds = excluded.builds,
                successes = excluded.successes,
                failures = excluded.failures,
                avg_duration_ms = excluded.avg_duration_ms
            "#,
        )
        .bind(format_date(m.date))
        .bind(i64::from(m.builds))
        .bind(i64::from(m.successes))
        .bind(i64::from(m.failures))
        .bind(m.avg_duration_ms as i64)
        .execute(self.store.pool())
        .await
        .storage_err("record build metric")?;
        Ok(())
    }

    pub async fn build_metrics(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<BuildMetric>> {
        let rows = sqlx::query(
            "SELECT date, builds, successes, failures, avg_duration_ms
             FROM build_metrics WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(self.store.pool())
        .await
        .storage_err("load build metrics")?;

        rows.iter()
            .map(|row| {
                Ok(BuildMetric {
                    date: parse_date(&row.get::<String, _>("date"))?,
                    builds: row.get::<i64, _>("builds") as u32,
                    successes: row.get::<i64, _>("successes") as u32,
                    failures: row.get::<i64, _>("failures") as u32,
                    avg_duration_ms: row.get::<i64, _>("avg_duration_ms") as u64,
                })
            })
            .collect()
    }

    // ── Collection runs ───────────────────────────────────────────────

    pub async fn collection_run(&self, kind: RunKind, window_days: u32) -> Result<Option<CollectionRun>> {
        let row = sqlx::query(
            "SELECT collected_at, period_start, period_end, truncated
             FROM collection_runs WHERE kind = ?1 AND window_days = ?2",
        )
        .bind(kind.as_str())
        .bind(i64::from(window_days))
        .fetch_optional(self.store.pool())
        .await
        .storage_err("load collection run")?;

        row.map(|row| {
            Ok(CollectionRun {
                collected_at: parse_ts(&row.get::<String, _>("collected_at"))?,
                period_start: parse_date(&row.get::<String, _>("period_start"))?,
                period_end: parse_date(&row.get::<String, _>("period_end"))?,
                truncated: row.get::<i64, _>("truncated") != 0,
            })
        })
        .transpose()
    }

    pub async fn record_run(&self, kind: RunKind, window_days: u32, run: &CollectionRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_runs
                (kind, window_days, collected_at, period_start, period_end, truncated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (kind, window_days) DO UPDATE SET
                collected_at = excluded.collected_at,
                period_start = excluded.period_start,
                period_end = excluded.period_end,
                truncated = excluded.truncated
            "#,
        )
        .bind(kind.as_str())
        .bind(i64::from(window_days))
        .bind(format_ts(run.collected_at))
        .bind(format_date(run.period_start))
        .bind(format_date(run.period_end))
        .bind(i64::from(run.truncated))
        .execute(self.store.pool())
        .await
        .storage_err("record collection run")?;
        Ok(())
    }
}

fn row_to_git_metric(row: &SqliteRow) -> Result<GitMetric> {
    let contributor: String = row.get("contributor");
    Ok(GitMetric {
        date: parse_date(&row.get::<String, _>("date"))?,
        commits_count: row.get::<i64, _>("commits_count") as u32,
        lines_added: row.get::<i64, _>("lines_added") as u64,
        lines_deleted: row.get::<i64, _>("lines_deleted") as u64,
        net_growth: row.get("net_growth"),
        files_changed: row.get::<i64, _>("files_changed") as u32,
        contributor: (!contributor.is_empty()).then_some(contributor),
    })
}

fn row_to_hotspot(row: &SqliteRow) -> Result<FileHotspot> {
    Ok(FileHotspot {
        file_path: row.get("file_path"),
        period_start: parse_date(&row.get::<String, _>("period_start"))?,
        period_end: parse_date(&row.get::<String, _>("period_end"))?,
        total_commits: row.get::<i64, _>("total_commits") as u32,
        file_edits: row.get::<i64, _>("file_edits") as u32,
        churn_rate: row.get("churn_rate"),
        stability: row.get::<String, _>("stability").parse()?,
        lines_changed: row.get::<i64, _>("lines_changed") as u64,
    })
}
