//! Periodic background collection of git metrics and hotspots.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ContextIntelligence;

/// Handle to a running collection task.
pub struct MetricsScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MetricsScheduler {
    /// Collect every `interval` (first run immediately) until shut down.
    /// Collection is never forced, so cached windows are reused.
    pub fn spawn(intelligence: Arc<ContextIntelligence>, interval: Duration, days: u32) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), days, "Metrics scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&intelligence, days).await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Metrics scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Metrics scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_once(intelligence: &ContextIntelligence, days: u32) {
    match intelligence.collect_git_metrics(days, false).await {
        Ok(rows) => debug!(rows = rows.len(), "Scheduled git collection finished"),
        Err(e) => {
            warn!(error = %e, "Scheduled git collection failed");
            return;
        }
    }
    if let Err(e) = intelligence.analyze_file_hotspots(days, false).await {
        warn!(error = %e, "Scheduled hotspot analysis failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunKind, StaticGitSource};
    use tiermind_config::IntelligenceConfig;
    use tiermind_core::system_clock;
    use tiermind_storage::TierStore;

    #[tokio::test]
    async fn collects_until_shutdown() {
        let ci = Arc::new(
            ContextIntelligence::new(
                TierStore::in_memory("tier3").await.unwrap(),
                Arc::new(StaticGitSource::new(Vec::new())),
                IntelligenceConfig::default(),
                system_clock(),
            )
            .await
            .unwrap(),
        );

        let scheduler = MetricsScheduler::spawn(ci.clone(), Duration::from_millis(20), 7);

        let mut collected = false;
        for _ in 0..100 {
            let git = ci.store().collection_run(RunKind::GitMetrics, 7).await.unwrap();
            let hot = ci.store().collection_run(RunKind::Hotspots, 7).await.unwrap();
            if git.is_some() && hot.is_some() {
                collected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(collected);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let ci = Arc::new(
            ContextIntelligence::new(
                TierStore::in_memory("tier3").await.unwrap(),
                Arc::new(StaticGitSource::unavailable()),
                IntelligenceConfig::default(),
                system_clock(),
            )
            .await
            .unwrap(),
        );

        let scheduler = MetricsScheduler::spawn(ci, Duration::from_millis(10), 7);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.is_finished());
        scheduler.shutdown().await;
    }
}
