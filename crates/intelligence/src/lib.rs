//! Tier 3: context intelligence.
//!
//! Derives daily git metrics, per-file churn hotspots, velocity trends and
//! actionable insights from a repository's history, and stores test and
//! build results alongside them. Derived rows are cached per analysis
//! window in a `collection_runs` table.

pub mod analysis;
pub mod git;
pub mod insights;
pub mod scheduler;
pub mod store;

pub use analysis::Window;
pub use git::{CommitRecord, FileChange, GitCli, GitLog, GitSource, StaticGitSource};
pub use scheduler::MetricsScheduler;
pub use store::{CollectionRun, MetricsStore, RunKind};

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;
use tiermind_config::IntelligenceConfig;
use tiermind_core::{
    BuildMetric, Error, FileHotspot, GitMetric, Insight, Result, SharedClock, TestMetric,
    TrendReport, Velocity,
};
use tiermind_storage::TierStore;
use tracing::{debug, info};

/// Database file name inside the data directory.
pub const DB_FILE: &str = "tier3-context-intelligence.db";

/// Tier 3 handle.
pub struct ContextIntelligence {
    store: MetricsStore,
    source: Arc<dyn GitSource>,
    config: IntelligenceConfig,
    clock: SharedClock,
}

impl ContextIntelligence {
    pub async fn new(
        store: TierStore,
        source: Arc<dyn GitSource>,
        config: IntelligenceConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        let store = MetricsStore::new(store).await?;
        Ok(Self {
            store,
            source,
            config,
            clock,
        })
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    pub fn config(&self) -> &IntelligenceConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn GitSource {
        self.source.as_ref()
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    fn window(&self, days: u32) -> Result<Window> {
        if days == 0 {
            return Err(Error::validation("analysis window must be at least one day"));
        }
        Window::ending(self.today(), days).ok_or_else(|| {
            Error::validation(format!(
                "analysis window of {days} days reaches past the earliest supported date"
            ))
        })
    }

    /// A stored run for this window that is still fresh. Truncated runs
    /// never count.
    async fn cached_run(&self, kind: RunKind, window: &Window) -> Result<Option<CollectionRun>> {
        let Some(run) = self.store.collection_run(kind, window.days).await? else {
            return Ok(None);
        };
        let same_period = run.period_start == window.start && run.period_end == window.end;
        let age = self.clock.now() - run.collected_at;
        let fresh = age < Duration::minutes(self.config.cache_ttl_minutes);
        Ok((same_period && fresh && !run.truncated).then_some(run))
    }

    async fn fetch_commits(&self, window: &Window) -> Result<GitLog> {
        let since = window.start.and_time(NaiveTime::MIN).and_utc();
        self.source.commits_since(since).await
    }

    fn new_run(&self, window: &Window, truncated: bool) -> CollectionRun {
        CollectionRun {
            collected_at: self.clock.now(),
            period_start: window.start,
            period_end: window.end,
            truncated,
        }
    }

    // ── Git metrics ───────────────────────────────────────────────────

    /// Daily aggregate metrics for the last `days` days, date ascending.
    ///
    /// Without `force`, a fresh cached run for the same window is served
    /// from storage and completed days already stored are left untouched.
    pub async fn collect_git_metrics(&self, days: u32, force: bool) -> Result<Vec<GitMetric>> {
        let window = self.window(days)?;

        if !force && self.cached_run(RunKind::GitMetrics, &window).await?.is_some() {
            debug!(days, "Serving git metrics from cache");
            return self.store.git_metrics(window.start, window.end, false).await;
        }

        let log = self.fetch_commits(&window).await?;
        let (aggregate, contributors) = analysis::daily_metrics(&log.commits, &window);
        let mut rows = aggregate;
        rows.extend(contributors);
        if log.truncated {
            rows = complete_days(rows, &log, window.end);
        }

        self.store
            .write_git_metrics(&rows, window.start, window.end, window.end, force)
            .await?;
        self.store
            .record_run(RunKind::GitMetrics, window.days, &self.new_run(&window, log.truncated))
            .await?;

        info!(
            source = %self.source.describe(),
            days,
            commits = log.commits.len(),
            truncated = log.truncated,
            force,
            "Git metrics collected"
        );
        self.store.git_metrics(window.start, window.end, false).await
    }

    /// Per-contributor daily rows for the last `days` days.
    pub async fn contributor_metrics(&self, days: u32) -> Result<Vec<GitMetric>> {
        let window = self.window(days)?;
        self.collect_git_metrics(days, false).await?;
        self.store.git_metrics(window.start, window.end, true).await
    }

    // ── Hotspots ──────────────────────────────────────────────────────

    /// Churn per file over the last `days` days, highest first.
    pub async fn analyze_file_hotspots(&self, days: u32, force: bool) -> Result<Vec<FileHotspot>> {
        let window = self.window(days)?;

        if !force && self.cached_run(RunKind::Hotspots, &window).await?.is_some() {
            debug!(days, "Serving hotspots from cache");
            return self.store.hotspots(window.start, window.end).await;
        }

        let log = self.fetch_commits(&window).await?;
        let hotspots = analysis::file_hotspots(
            &log.commits,
            &window,
            self.config.churn_low,
            self.config.churn_high,
        );
        self.store
            .replace_hotspots(&hotspots, window.start, window.end)
            .await?;
        self.store
            .record_run(RunKind::Hotspots, window.days, &self.new_run(&window, log.truncated))
            .await?;

        info!(days, files = hotspots.len(), "File hotspots analyzed");
        self.store.hotspots(window.start, window.end).await
    }

    /// Latest stored hotspot rows for the given paths.
    pub async fn hotspots_for_files(&self, paths: &[String]) -> Result<Vec<FileHotspot>> {
        self.store.latest_hotspots_for(paths).await
    }

    // ── Velocity and trends ───────────────────────────────────────────

    pub async fn calculate_velocity(&self, days: u32) -> Result<Velocity> {
        let metrics = self.collect_git_metrics(days, false).await?;
        Ok(analysis::velocity(&metrics, days))
    }

    pub async fn analyze_trends(&self, days: u32) -> Result<TrendReport> {
        let window = self.window(days)?;
        let metrics = self.collect_git_metrics(days, false).await?;
        let (trend, trend_direction) = analysis::trend(&metrics, &window, self.config.trend_noise);
        Ok(TrendReport {
            velocity: analysis::velocity(&metrics, days),
            trend,
            trend_direction,
        })
    }

    /// Every insight for the last `days` days, most severe first.
    pub async fn generate_insights(&self, days: u32) -> Result<Vec<Insight>> {
        let window = self.window(days)?;
        let report = self.analyze_trends(days).await?;
        let hotspots = self.analyze_file_hotspots(days, false).await?;
        let tests = self.store.test_metrics(window.start, window.end).await?;
        let builds = self.store.build_metrics(window.start, window.end).await?;

        Ok(insights::generate(
            &report,
            &hotspots,
            &tests,
            &builds,
            &self.config,
            self.clock.now(),
        ))
    }

    // ── Test and build results ────────────────────────────────────────

    /// Store the test results for a day, replacing any earlier record.
    pub async fn record_test_metric(&self, metric: TestMetric) -> Result<()> {
        let accounted = u64::from(metric.passed) + u64::from(metric.failed) + u64::from(metric.skipped);
        if accounted > u64::from(metric.total) {
            return Err(Error::validation(format!(
                "passed + failed + skipped ({accounted}) exceeds total ({})",
                metric.total
            )));
        }
        if let Some(c) = metric.coverage {
            if !(0.0..=1.0).contains(&c) {
                return Err(Error::validation(format!("coverage {c} is outside [0, 1]")));
            }
        }
        self.store.upsert_test_metric(&metric).await
    }

    /// Store the build results for a day, replacing any earlier record.
    pub async fn record_build_metric(&self, metric: BuildMetric) -> Result<()> {
        if u64::from(metric.successes) + u64::from(metric.failures) > u64::from(metric.builds) {
            return Err(Error::validation(format!(
                "successes + failures exceeds builds ({})",
                metric.builds
            )));
        }
        self.store.upsert_build_metric(&metric).await
    }

    pub async fn test_metrics(&self, days: u32) -> Result<Vec<TestMetric>> {
        let window = self.window(days)?;
        self.store.test_metrics(window.start, window.end).await
    }

    pub async fn build_metrics(&self, days: u32) -> Result<Vec<BuildMetric>> {
        let window = self.window(days)?;
        self.store.build_metrics(window.start, window.end).await
    }
}

/// Rows a truncated read can vouch for. The read stops partway through
/// its oldest day, so that day and anything earlier are left for a later
/// collection. Today is rewritten on every run and is always kept.
fn complete_days(rows: Vec<GitMetric>, log: &GitLog, today: NaiveDate) -> Vec<GitMetric> {
    let Some(oldest) = log.commits.first().map(|c| c.timestamp.date_naive()) else {
        return Vec::new();
    };
    let kept: Vec<GitMetric> = rows
        .into_iter()
        .filter(|m| m.date > oldest || m.date == today)
        .collect();
    debug!(%oldest, kept = kept.len(), "Truncated read, skipping incomplete days");
    kept
}
