//! The unified context manager.
//!
//! [`ContextEngine`] owns one handle per tier and answers a request by
//! querying all three concurrently, each under its own timeout. A tier that
//! errors or runs late becomes an `Unavailable`/`TimedOut` outcome; the
//! others are still returned. The merged result is trimmed to the token
//! budget and timed against the performance target.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tiermind_config::{AppConfig, ContextConfig};
use tiermind_core::{
    ContextBundle, ContextConsumer, ConversationSummary, IncludeTiers, InjectRequest,
    InjectedContext, Result, SearchOptions, SharedClock, Stability, Tier, Tier1Context,
    Tier2Context, Tier3Context, TierNotice, TierOutcome, Turn, system_clock,
};
use tiermind_intelligence::{ContextIntelligence, GitCli, MetricsScheduler};
use tiermind_knowledge::{KnowledgeGraph, detect_namespace};
use tiermind_storage::{StoreOptions, TierStore};
use tiermind_telemetry::PerformanceMonitor;
use tiermind_working_memory::WorkingMemory;
use tracing::{debug, info, warn};

use crate::budget::enforce_budget;
use crate::summary::render_summary;
use crate::token::estimate_tokens;

/// Input for [`ContextEngine::build_context`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub user_request: String,
    /// Files the caller is working on
    #[serde(default)]
    pub current_files: Vec<String>,
    /// Falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,
    #[serde(default)]
    pub include_tiers: IncludeTiers,
}

impl BuildRequest {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            user_request: user_request.into(),
            current_files: Vec::new(),
            token_budget: None,
            include_tiers: IncludeTiers::all(),
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.current_files.push(path.into());
        self
    }

    pub fn with_budget(mut self, tokens: usize) -> Self {
        self.token_budget = Some(tokens);
        self
    }
}

pub struct ContextEngine {
    working_memory: Arc<WorkingMemory>,
    knowledge: Arc<KnowledgeGraph>,
    intelligence: Arc<ContextIntelligence>,
    config: ContextConfig,
    monitor: PerformanceMonitor,
    consumers: RwLock<Vec<Arc<dyn ContextConsumer>>>,
    scheduler: Mutex<Option<MetricsScheduler>>,
    clock: SharedClock,
}

impl ContextEngine {
    /// Open the three tier databases under `storage.data_dir` and point
    /// Tier 3 at `intelligence.repo_path`.
    ///
    /// When `intelligence.scheduled_collection` is set, background Tier 3
    /// collection starts here and keeps the metrics cache warm.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        let options = StoreOptions {
            max_connections: config.storage.max_connections,
            busy_timeout: Duration::from_millis(config.storage.busy_timeout_ms),
        };
        let clock = system_clock();

        let tier1 = TierStore::open(
            &data_dir.join(tiermind_working_memory::DB_FILE),
            "tier1",
            &options,
        )
        .await?;
        let tier2 = TierStore::open(&data_dir.join(tiermind_knowledge::DB_FILE), "tier2", &options)
            .await?;
        let tier3 = TierStore::open(
            &data_dir.join(tiermind_intelligence::DB_FILE),
            "tier3",
            &options,
        )
        .await?;

        let git = GitCli::new(
            config.intelligence.repo_path.clone(),
            Duration::from_secs(config.intelligence.max_analysis_secs),
        );

        let working_memory =
            WorkingMemory::new(tier1, config.working_memory.clone(), clock.clone()).await?;
        let knowledge = KnowledgeGraph::new(tier2, config.knowledge.clone(), clock.clone()).await?;
        let intelligence = ContextIntelligence::new(
            tier3,
            Arc::new(git),
            config.intelligence.clone(),
            clock.clone(),
        )
        .await?;

        let engine = Self::from_parts(
            working_memory,
            knowledge,
            Arc::new(intelligence),
            config.context.clone(),
            clock,
        );
        let scheduled = engine.start_scheduler();
        info!(data_dir = %data_dir.display(), scheduled, "Context engine ready");
        Ok(engine)
    }

    /// Assemble an engine from prebuilt tiers.
    pub fn from_parts(
        working_memory: WorkingMemory,
        knowledge: KnowledgeGraph,
        intelligence: Arc<ContextIntelligence>,
        config: ContextConfig,
        clock: SharedClock,
    ) -> Self {
        let monitor = PerformanceMonitor::new(Duration::from_millis(config.performance_target_ms));
        Self {
            working_memory: Arc::new(working_memory),
            knowledge: Arc::new(knowledge),
            intelligence,
            config,
            monitor,
            consumers: RwLock::new(Vec::new()),
            scheduler: Mutex::new(None),
            clock,
        }
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.working_memory
    }

    pub fn knowledge(&self) -> &KnowledgeGraph {
        &self.knowledge
    }

    pub fn intelligence(&self) -> &Arc<ContextIntelligence> {
        &self.intelligence
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Start periodic Tier 3 collection if it is enabled and not already
    /// running. Returns whether a scheduler is running afterwards. The task
    /// stops when the engine is dropped or [`Self::stop_scheduler`] is called.
    pub fn start_scheduler(&self) -> bool {
        let cfg = self.intelligence.config();
        if !cfg.scheduled_collection {
            return false;
        }
        let mut slot = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|s| !s.is_finished()) {
            return true;
        }
        *slot = Some(MetricsScheduler::spawn(
            self.intelligence.clone(),
            Duration::from_secs(cfg.collection_interval_minutes.max(1) * 60),
            cfg.default_window_days,
        ));
        true
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }

    /// Stop background collection and wait for the task to finish.
    pub async fn stop_scheduler(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
    }

    pub fn register_consumer(&self, consumer: Arc<dyn ContextConsumer>) {
        info!(consumer = consumer.name(), "Context consumer registered");
        self.consumers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(consumer);
    }

    // ── Assembly ──────────────────────────────────────────────────────

    /// Query every included tier concurrently and merge the results.
    ///
    /// Never fails: tier errors and timeouts are reported in the bundle.
    pub async fn build_context(&self, request: &BuildRequest) -> ContextBundle {
        let started = Instant::now();
        let include = &request.include_tiers;

        let (mut tier1, mut tier2, mut tier3) = tokio::join!(
            self.run_tier(
                Tier::WorkingMemory,
                include.includes(Tier::WorkingMemory),
                self.tier1_context(request),
            ),
            self.run_tier(
                Tier::KnowledgeGraph,
                include.includes(Tier::KnowledgeGraph),
                self.tier2_context(request),
            ),
            self.run_tier(
                Tier::ContextIntelligence,
                include.includes(Tier::ContextIntelligence),
                self.tier3_context(request),
            ),
        );

        let budget = request
            .token_budget
            .unwrap_or(self.config.default_token_budget);
        let (mut token_usage, drops) = enforce_budget(&mut tier1, &mut tier2, &mut tier3, budget);

        let merged_summary = render_summary(&tier1, &tier2, &tier3);
        token_usage.summary = estimate_tokens(&merged_summary);

        let elapsed = started.elapsed();
        let performance_warning = self.monitor.record("build_context", elapsed);

        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            used = token_usage.used,
            budget,
            drops = drops.len(),
            "Context built"
        );

        ContextBundle {
            tier1,
            tier2,
            tier3,
            merged_summary,
            token_usage,
            drops,
            elapsed_ms: elapsed.as_millis() as u64,
            performance_warning,
        }
    }

    /// Build context for an agent request and notify registered consumers.
    pub async fn inject_context(&self, request: InjectRequest) -> InjectedContext {
        let build = BuildRequest {
            conversation_id: request.conversation_id.clone(),
            user_request: request.user_request.clone(),
            current_files: request.current_file.iter().cloned().collect(),
            token_budget: None,
            include_tiers: request.include_tiers.clone(),
        };
        let bundle = self.build_context(&build).await;

        let mut unavailable = Vec::new();
        let reasons = [
            (Tier::WorkingMemory, bundle.tier1.failure_reason()),
            (Tier::KnowledgeGraph, bundle.tier2.failure_reason()),
            (Tier::ContextIntelligence, bundle.tier3.failure_reason()),
        ];
        for (tier, reason) in reasons {
            if let Some(reason) = reason {
                unavailable.push(TierNotice { tier, reason });
            }
        }

        let injected = InjectedContext {
            tier1: bundle.tier1.into_available(),
            tier2: bundle.tier2.into_available(),
            tier3: bundle.tier3.into_available(),
            merged_summary: bundle.merged_summary,
            injection_time_ms: bundle.elapsed_ms,
            performance_ok: bundle.performance_warning.is_none(),
            performance_warning: bundle.performance_warning,
            unavailable,
        };

        let consumers = self
            .consumers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for consumer in consumers {
            debug!(consumer = consumer.name(), "Notifying context consumer");
            consumer.on_context(&request, &injected);
        }

        injected
    }

    async fn run_tier<T>(
        &self,
        tier: Tier,
        included: bool,
        query: impl Future<Output = Result<T>>,
    ) -> TierOutcome<T> {
        if !included {
            return TierOutcome::Excluded;
        }
        let limit = Duration::from_millis(self.config.tier_timeout_ms);
        match tokio::time::timeout(limit, query).await {
            Ok(Ok(data)) => TierOutcome::Available(data),
            Ok(Err(e)) => {
                warn!(tier = %tier, error = %e, "Tier unavailable, continuing without it");
                TierOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(tier = %tier, timeout_ms = self.config.tier_timeout_ms, "Tier timed out");
                TierOutcome::TimedOut {
                    after_ms: self.config.tier_timeout_ms,
                }
            }
        }
    }

    // ── Per-tier queries ──────────────────────────────────────────────

    async fn tier1_context(&self, request: &BuildRequest) -> Result<Tier1Context> {
        let wm = &self.working_memory;

        let (active_conversation, active_turns): (Option<ConversationSummary>, Vec<Turn>) = match &request.conversation_id {
            Some(id) => match wm.get_conversation(id).await? {
                Some(conversation) => {
                    let skip = conversation
                        .turns
                        .len()
                        .saturating_sub(self.config.active_turns);
                    let summary = ConversationSummary {
                        id: conversation.id.clone(),
                        title: conversation.title.clone(),
                        created_at: conversation.created_at,
                        quality_score: conversation.quality_score,
                        turn_count: conversation.turns.len(),
                    };
                    (Some(summary), conversation.turns.into_iter().skip(skip).collect())
                }
                None => {
                    debug!(conversation_id = %id, "Active conversation not in working memory");
                    (None, Vec::new())
                }
            },
            None => (None, Vec::new()),
        };

        let recent_conversations = wm
            .recent_summaries(self.config.recent_conversations)
            .await?;

        let mut entities = wm
            .extract_entities_from_recent(wm.config().resolution_conversations)
            .await?;
        entities.truncate(self.config.max_entities);

        let resolved_references = wm.resolve_references_in(&request.user_request).await?;

        Ok(Tier1Context {
            active_conversation,
            active_turns,
            recent_conversations,
            entities,
            resolved_references,
        })
    }

    async fn tier2_context(&self, request: &BuildRequest) -> Result<Tier2Context> {
        let namespace = request
            .current_files
            .iter()
            .find_map(|path| detect_namespace(path));

        let patterns = self
            .knowledge
            .search(&SearchOptions {
                query: request.user_request.clone(),
                scope: None,
                namespace_hint: namespace.clone(),
                limit: self.config.max_patterns,
            })
            .await?;

        Ok(Tier2Context {
            namespace,
            patterns,
        })
    }

    async fn tier3_context(&self, request: &BuildRequest) -> Result<Tier3Context> {
        let ci = &self.intelligence;
        let days = ci.config().default_window_days;

        let report = ci.analyze_trends(days).await?;
        let all_hotspots = ci.analyze_file_hotspots(days, false).await?;
        let tests = ci.test_metrics(days).await?;
        let builds = ci.build_metrics(days).await?;

        let insights = tiermind_intelligence::insights::generate(
            &report,
            &all_hotspots,
            &tests,
            &builds,
            ci.config(),
            self.clock.now(),
        );

        let hotspots: Vec<_> = all_hotspots
            .into_iter()
            .filter(|h| h.stability == Stability::Unstable)
            .take(self.config.max_hotspots)
            .collect();

        let file_warnings = if request.current_files.is_empty() {
            Vec::new()
        } else {
            ci.hotspots_for_files(&request.current_files)
                .await?
                .into_iter()
                .filter(|h| h.stability != Stability::Stable)
                .collect()
        };

        Ok(Tier3Context {
            velocity: report.velocity,
            trend_direction: report.trend_direction,
            hotspots,
            file_warnings,
            insights,
        })
    }
}
