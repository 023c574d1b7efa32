//! End-to-end behaviour of the unified context manager over in-memory tiers.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiermind_config::{ContextConfig, IntelligenceConfig, KnowledgeConfig, WorkingMemoryConfig};
use tiermind_context::{BuildRequest, ContextEngine};
use tiermind_core::{
    ContextConsumer, EntityKind, InjectRequest, InjectedContext, IncludeTiers, ManualClock,
    NewPattern, PatternType, Result, Stability, Tier, TierOutcome,
};
use tiermind_intelligence::{
    CommitRecord, ContextIntelligence, FileChange, GitLog, GitSource, StaticGitSource,
};
use tiermind_knowledge::KnowledgeGraph;
use tiermind_storage::TierStore;
use tiermind_working_memory::WorkingMemory;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 30, 15, 0, 0).unwrap()
}

fn relaxed_config() -> ContextConfig {
    ContextConfig {
        tier_timeout_ms: 5_000,
        performance_target_ms: 60_000,
        ..ContextConfig::default()
    }
}

/// 100 commits over the last 30 days; `src/ui/HostControlPanel.razor` is
/// in 30 of them.
fn history() -> Vec<CommitRecord> {
    (0..100)
        .map(|i: i64| {
            let mut files = vec![FileChange {
                path: format!("src/module_{i}.rs"),
                added: 10,
                deleted: 2,
            }];
            if i % 10 < 3 {
                files.push(FileChange {
                    path: "src/ui/HostControlPanel.razor".into(),
                    added: 3,
                    deleted: 3,
                });
            }
            CommitRecord {
                hash: format!("{i:040x}"),
                author: "dev".into(),
                timestamp: start() - ChronoDuration::hours(7 * i),
                files,
            }
        })
        .collect()
}

async fn engine_with(
    source: Arc<dyn GitSource>,
    config: ContextConfig,
) -> (ContextEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(start()));
    let wm = WorkingMemory::new(
        TierStore::in_memory("tier1").await.unwrap(),
        WorkingMemoryConfig::default(),
        clock.clone(),
    )
    .await
    .unwrap();
    let kg = KnowledgeGraph::new(
        TierStore::in_memory("tier2").await.unwrap(),
        KnowledgeConfig::default(),
        clock.clone(),
    )
    .await
    .unwrap();
    let ci = ContextIntelligence::new(
        TierStore::in_memory("tier3").await.unwrap(),
        source,
        IntelligenceConfig::default(),
        clock.clone(),
    )
    .await
    .unwrap();
    let engine = ContextEngine::from_parts(wm, kg, Arc::new(ci), config, clock.clone());
    (engine, clock)
}

async fn engine() -> (ContextEngine, Arc<ManualClock>) {
    engine_with(Arc::new(StaticGitSource::new(history())), relaxed_config()).await
}

#[tokio::test]
async fn it_resolves_to_the_fab_button() {
    let (engine, clock) = engine().await;
    engine
        .working_memory()
        .import_json(
            &json!([{"user": "Add a FAB button in HostControlPanel.razor"}]),
            "copilot-chat",
        )
        .await
        .unwrap();
    clock.advance(ChronoDuration::minutes(1));

    let injected = engine
        .inject_context(InjectRequest::new("make it purple"))
        .await;

    let tier1 = injected.tier1.expect("tier1 available");
    let resolved = &tier1.resolved_references;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].term, "it");
    assert_eq!(resolved[0].entity.kind, EntityKind::UiElement);
    assert_eq!(resolved[0].entity.reference, "fab-button");
    assert!(injected.merged_summary.contains("\"it\" refers to FAB button"));
    assert!(injected.unavailable.is_empty());
}

#[tokio::test]
async fn follow_up_three_minutes_later() {
    let (engine, clock) = engine().await;
    let wm = engine.working_memory();
    wm.import_json(
        &json!([{"user": "Add a button to X"}, {"assistant": "Done"}]),
        "test",
    )
    .await
    .unwrap();
    clock.advance(ChronoDuration::minutes(3));
    let second = wm
        .import_json(&json!([{"user": "make it purple"}]), "test")
        .await
        .unwrap();

    let bundle = engine
        .build_context(&BuildRequest::new("make it purple").with_conversation(&second.conversation_id))
        .await;

    let tier1 = bundle.tier1.as_available().unwrap();
    assert_eq!(
        tier1.active_conversation.as_ref().unwrap().id,
        second.conversation_id
    );
    assert_eq!(tier1.active_turns.len(), 1);
    assert_eq!(tier1.recent_conversations.len(), 2);
    assert_eq!(tier1.resolved_references[0].entity.text, "button");
    assert_eq!(tier1.resolved_references[0].entity.turn_index, 0);
}

#[tokio::test]
async fn decayed_pattern_is_still_found() {
    let (engine, clock) = engine().await;
    engine
        .knowledge()
        .store_pattern(NewPattern::new(
            "auth-flow",
            "auth-flow",
            "Validate the session token, then refresh it before it expires",
            PatternType::Workflow,
            0.95,
        ))
        .await
        .unwrap();
    clock.advance(ChronoDuration::days(30));

    let bundle = engine
        .build_context(&BuildRequest::new("how does auth work"))
        .await;
    let patterns = &bundle.tier2.as_available().unwrap().patterns;
    assert_eq!(patterns.len(), 1);
    assert!(patterns[0].confidence >= 0.0 && patterns[0].confidence < 0.95);
}

#[tokio::test]
async fn current_file_drives_namespace_and_warnings() {
    let (engine, _) = engine().await;
    engine
        .knowledge()
        .store_pattern(
            NewPattern::new(
                "panel-colors",
                "panel button colors",
                "Use theme tokens for button colors",
                PatternType::Preference,
                0.8,
            )
            .with_namespace("ui"),
        )
        .await
        .unwrap();

    let bundle = engine
        .build_context(
            &BuildRequest::new("change the button colors")
                .with_file("src/ui/HostControlPanel.razor"),
        )
        .await;

    let tier2 = bundle.tier2.as_available().unwrap();
    assert_eq!(tier2.namespace.as_deref(), Some("ui"));
    assert_eq!(tier2.patterns[0].id, "panel-colors");

    let tier3 = bundle.tier3.as_available().unwrap();
    assert_eq!(tier3.file_warnings.len(), 1);
    assert_eq!(tier3.file_warnings[0].stability, Stability::Unstable);
    assert!((tier3.file_warnings[0].churn_rate - 0.30).abs() < 1e-9);
    assert_eq!(tier3.hotspots[0].file_path, "src/ui/HostControlPanel.razor");
}

#[tokio::test]
async fn budget_trims_tier3_before_tier1() {
    let (engine, clock) = engine().await;
    for i in 0..3 {
        engine
            .working_memory()
            .import_json(
                &json!([
                    {"user": format!("Refactor the sidebar component in Layout{i}.razor")},
                    {"assistant": "Moved the toggle into NavMenu and updated render()"}
                ]),
                "test",
            )
            .await
            .unwrap();
        clock.advance(ChronoDuration::seconds(30));
    }

    let full = engine
        .build_context(&BuildRequest::new("update the sidebar").with_budget(1_000_000))
        .await;
    assert!(full.drops.is_empty());
    let tier1_tokens = full.token_usage.per_tier[&Tier::WorkingMemory];
    let tier3_tokens = full.token_usage.per_tier[&Tier::ContextIntelligence];
    assert!(!full.tier3.as_available().unwrap().insights.is_empty());

    // One token short of the full bundle
    let budget = tier1_tokens + full.token_usage.per_tier[&Tier::KnowledgeGraph] + tier3_tokens - 1;
    let trimmed = engine
        .build_context(&BuildRequest::new("update the sidebar").with_budget(budget))
        .await;

    assert!(!trimmed.drops.is_empty());
    assert!(trimmed
        .drops
        .iter()
        .all(|d| d.tier == Tier::ContextIntelligence));
    let t1_full = full.tier1.as_available().unwrap();
    let t1_trimmed = trimmed.tier1.as_available().unwrap();
    assert_eq!(
        t1_trimmed.recent_conversations.len(),
        t1_full.recent_conversations.len()
    );
    assert_eq!(t1_trimmed.entities.len(), t1_full.entities.len());
    assert!(trimmed.token_usage.used <= budget);
}

#[tokio::test]
async fn repository_outside_version_control_only_loses_tier3() {
    let (engine, _) =
        engine_with(Arc::new(StaticGitSource::unavailable()), relaxed_config()).await;
    engine
        .working_memory()
        .import_json(&json!([{"user": "open Program.cs"}]), "test")
        .await
        .unwrap();

    let injected = engine.inject_context(InjectRequest::new("fix it")).await;
    assert!(injected.tier1.is_some());
    assert!(injected.tier2.is_some());
    assert!(injected.tier3.is_none());
    assert_eq!(injected.unavailable.len(), 1);
    assert_eq!(injected.unavailable[0].tier, Tier::ContextIntelligence);
    assert!(injected.unavailable[0].reason.contains("Repository unavailable"));
}

#[tokio::test]
async fn closed_tier_database_is_reported_unavailable() {
    let (engine, _) = engine().await;
    engine.knowledge().store().close().await;

    let bundle = engine.build_context(&BuildRequest::new("anything")).await;
    assert!(bundle.tier1.is_available());
    assert!(matches!(bundle.tier2, TierOutcome::Unavailable { .. }));
    assert!(bundle.tier3.is_available());
    assert!(bundle.merged_summary.contains("tier2 unavailable"));
}

struct SlowSource;

#[async_trait]
impl GitSource for SlowSource {
    async fn commits_since(&self, _since: DateTime<Utc>) -> Result<GitLog> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(GitLog::default())
    }

    fn describe(&self) -> String {
        "slow".into()
    }
}

#[tokio::test]
async fn slow_tier_times_out_without_blocking_others() {
    let config = ContextConfig {
        tier_timeout_ms: 100,
        performance_target_ms: 60_000,
        ..ContextConfig::default()
    };
    let (engine, _) = engine_with(Arc::new(SlowSource), config).await;

    let started = std::time::Instant::now();
    let bundle = engine.build_context(&BuildRequest::new("status")).await;
    assert!(started.elapsed() < Duration::from_secs(3));

    assert!(bundle.tier1.is_available());
    assert!(bundle.tier2.is_available());
    assert!(matches!(bundle.tier3, TierOutcome::TimedOut { after_ms: 100 }));
}

#[tokio::test]
async fn excluded_tiers_are_not_queried_or_reported() {
    let (engine, _) =
        engine_with(Arc::new(StaticGitSource::unavailable()), relaxed_config()).await;
    let mut request = InjectRequest::new("hello");
    request.include_tiers = IncludeTiers::all().set(Tier::ContextIntelligence, false);

    let injected = engine.inject_context(request).await;
    assert!(injected.tier3.is_none());
    assert!(injected.unavailable.is_empty());
    assert!(injected.performance_ok);
}

#[tokio::test]
async fn slow_assembly_carries_a_warning() {
    let config = ContextConfig {
        tier_timeout_ms: 5_000,
        performance_target_ms: 0,
        ..ContextConfig::default()
    };
    let (engine, _) = engine_with(Arc::new(StaticGitSource::new(history())), config).await;

    let injected = engine.inject_context(InjectRequest::new("status")).await;
    assert!(!injected.performance_ok);
    assert!(injected.performance_warning.unwrap().contains("target 0ms"));
    assert_eq!(engine.monitor().summary("build_context").unwrap().count, 1);
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl ContextConsumer for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_context(&self, request: &InjectRequest, context: &InjectedContext) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{}", request.user_request, context.tier1.is_some()));
    }
}

#[tokio::test]
async fn consumers_are_notified() {
    let (engine, _) = engine().await;
    let recorder = Arc::new(Recorder::default());
    engine.register_consumer(recorder.clone());

    engine.inject_context(InjectRequest::new("first")).await;
    engine.inject_context(InjectRequest::new("second")).await;

    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec!["first:true".to_string(), "second:true".to_string()]
    );
}

#[tokio::test]
async fn open_creates_tier_databases_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiermind_config::AppConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config.intelligence.repo_path = dir.path().to_path_buf();
    config.context = relaxed_config();

    let engine = ContextEngine::open(&config).await.unwrap();
    for file in [
        tiermind_working_memory::DB_FILE,
        tiermind_knowledge::DB_FILE,
        tiermind_intelligence::DB_FILE,
    ] {
        assert!(config.storage.data_dir.join(file).exists(), "{file} missing");
    }

    // The temp dir is not a repository: tier 3 drops out, the rest answer
    let bundle = engine.build_context(&BuildRequest::new("hello")).await;
    assert!(bundle.tier1.is_available());
    assert!(!bundle.tier3.is_available());

    // Background collection starts with the engine
    assert!(engine.scheduler_running());
    assert!(engine.start_scheduler());
    engine.stop_scheduler().await;
    assert!(!engine.scheduler_running());
}

#[tokio::test]
async fn open_without_scheduled_collection_leaves_scheduler_off() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiermind_config::AppConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config.intelligence.repo_path = dir.path().to_path_buf();
    config.intelligence.scheduled_collection = false;
    config.context = relaxed_config();

    let engine = ContextEngine::open(&config).await.unwrap();
    assert!(!engine.scheduler_running());
    assert!(!engine.start_scheduler());
}
