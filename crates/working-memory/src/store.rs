//! SQLite-backed working memory.
//!
//! Three tables: `conversations` (with an insertion sequence used to break
//! `created_at` ties), `turns` and `entities`, the latter two cascading
//! from their conversation.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tiermind_config::WorkingMemoryConfig;
use tiermind_core::{
    Conversation, ConversationSummary, Entity, Error, ImportResult, ResolvedReference, Result,
    SharedClock, Turn, TurnInput,
};
use tiermind_storage::{Migration, SqlxResultExt, TierStore, format_ts, parse_ts};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::EntityExtractor;
use crate::quality::quality_score;
use crate::resolver::{DeicticScanner, PhraseAnchor, RecencyWindow, resolve_reference};

const MIGRATIONS: &[Migration] = &[
    Migration::new(
        "conversations",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            id            TEXT UNIQUE NOT NULL,
            title         TEXT NOT NULL,
            source        TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            quality_score REAL NOT NULL DEFAULT 0.0
                          CHECK (quality_score >= 0.0 AND quality_score <= 1.0)
        )
        "#,
    ),
    Migration::new(
        "conversations_recency_idx",
        "CREATE INDEX IF NOT EXISTS idx_conversations_recency ON conversations(created_at, seq)",
    ),
    Migration::new(
        "turns",
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            PRIMARY KEY (conversation_id, position)
        )
        "#,
    ),
    Migration::new(
        "turns_timestamp_idx",
        "CREATE INDEX IF NOT EXISTS idx_turns_timestamp ON turns(timestamp)",
    ),
    Migration::new(
        "entities",
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            turn_index      INTEGER NOT NULL,
            kind            TEXT NOT NULL
                            CHECK (kind IN ('file', 'class', 'method', 'ui_element')),
            literal         TEXT NOT NULL,
            reference       TEXT NOT NULL,
            char_offset     INTEGER NOT NULL,
            timestamp       TEXT NOT NULL
        )
        "#,
    ),
    Migration::new(
        "entities_conversation_idx",
        "CREATE INDEX IF NOT EXISTS idx_entities_conversation ON entities(conversation_id, turn_index)",
    ),
];

const TITLE_MAX_CHARS: usize = 60;

/// Tier 1 handle.
pub struct WorkingMemory {
    store: TierStore,
    config: WorkingMemoryConfig,
    clock: SharedClock,
    extractor: EntityExtractor,
    scanner: DeicticScanner,
}

impl WorkingMemory {
    /// Wrap a tier store, creating the schema if needed.
    pub async fn new(
        store: TierStore,
        config: WorkingMemoryConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        store.migrate(MIGRATIONS).await?;
        Ok(Self {
            store,
            config,
            clock,
            extractor: EntityExtractor::new()?,
            scanner: DeicticScanner::new()?,
        })
    }

    pub fn store(&self) -> &TierStore {
        &self.store
    }

    pub fn config(&self) -> &WorkingMemoryConfig {
        &self.config
    }

    // ── Import ────────────────────────────────────────────────────────

    /// Store a conversation, extract its entities and evict the oldest
    /// conversations beyond capacity, all in one transaction.
    pub async fn import_conversation(
        &self,
        turns: &[TurnInput],
        source: &str,
    ) -> Result<ImportResult> {
        if turns.is_empty() {
            return Err(Error::validation("Conversation has no turns"));
        }
        if turns.iter().all(|t| t.content.trim().is_empty()) {
            return Err(Error::validation("Every turn in the conversation is blank"));
        }

        let now = self.clock.now();
        let conversation_id = Uuid::new_v4().to_string();

        let stamped: Vec<DateTime<Utc>> = turns
            .iter()
            .map(|t| t.timestamp.map_or(now, |ts| ts.min(now)))
            .collect();

        let mut entities = Vec::new();
        for (index, turn) in turns.iter().enumerate() {
            for mention in self.extractor.extract(&turn.content) {
                entities.push((index, mention));
            }
        }
        let score = quality_score(turns, entities.len());

        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .storage_err("begin conversation import")?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, source, created_at, quality_score)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&conversation_id)
        .bind(derive_title(turns))
        .bind(source)
        .bind(format_ts(now))
        .bind(score as f64)
        .execute(&mut *tx)
        .await
        .storage_err("insert conversation")?;

        for (position, (turn, ts)) in turns.iter().zip(&stamped).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO turns (conversation_id, position, role, content, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&conversation_id)
            .bind(position as i64)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(format_ts(*ts))
            .execute(&mut *tx)
            .await
            .storage_err("insert turn")?;
        }

        for (turn_index, mention) in &entities {
            sqlx::query(
                r#"
                INSERT INTO entities
                    (conversation_id, turn_index, kind, literal, reference, char_offset, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&conversation_id)
            .bind(*turn_index as i64)
            .bind(mention.kind.as_str())
            .bind(&mention.text)
            .bind(&mention.reference)
            .bind(mention.offset as i64)
            .bind(format_ts(stamped[*turn_index]))
            .execute(&mut *tx)
            .await
            .storage_err("insert entity")?;
        }

        let evicted = self.evict_overflow(&mut tx).await?;
        tx.commit().await.storage_err("commit conversation import")?;

        debug!(
            conversation_id = %conversation_id,
            turns = turns.len(),
            entities = entities.len(),
            quality = score,
            "Conversation imported"
        );

        Ok(ImportResult {
            conversation_id,
            quality_score: score,
            turns_imported: turns.len(),
            entities_extracted: entities.len(),
            evicted,
        })
    }

    /// Parse caller JSON (full or shorthand turn objects) and import it.
    pub async fn import_json(
        &self,
        turns: &serde_json::Value,
        source: &str,
    ) -> Result<ImportResult> {
        let turns = tiermind_core::parse_turns(turns)?;
        self.import_conversation(&turns, source).await
    }

    /// Delete the oldest conversations while over capacity.
    async fn evict_overflow(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<Vec<String>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&mut **tx)
            .await
            .storage_err("count conversations")?;

        let excess = count - self.config.capacity as i64;
        if excess <= 0 {
            return Ok(vec![]);
        }

        let oldest: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM conversations ORDER BY created_at ASC, seq ASC LIMIT ?1",
        )
        .bind(excess)
        .fetch_all(&mut **tx)
        .await
        .storage_err("select conversations to evict")?;

        for id in &oldest {
            sqlx::query("DELETE FROM conversations WHERE id = ?1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .storage_err("evict conversation")?;
        }

        info!(
            evicted = oldest.len(),
            capacity = self.config.capacity,
            "Evicted oldest conversations from working memory"
        );
        Ok(oldest)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Load a conversation with its turns and entities.
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, title, source, created_at, quality_score FROM conversations WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.store.pool())
        .await
        .storage_err("load conversation")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let turns = sqlx::query(
            r#"
            SELECT position, role, content, timestamp FROM turns
            WHERE conversation_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.store.pool())
        .await
        .storage_err("load turns")?
        .iter()
        .map(row_to_turn)
        .collect::<Result<Vec<_>>>()?;

        let entities = sqlx::query(
            r#"
            SELECT conversation_id, turn_index, kind, literal, reference, char_offset, timestamp
            FROM entities
            WHERE conversation_id = ?1
            ORDER BY turn_index ASC, char_offset ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.store.pool())
        .await
        .storage_err("load entities")?
        .iter()
        .map(row_to_entity)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Conversation {
            id: row.get("id"),
            title: row.get("title"),
            source: row.get("source"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            quality_score: row.get::<f64, _>("quality_score") as f32,
            turns,
            entities,
        }))
    }

    /// Most recent conversations first, fully loaded.
    pub async fn get_recent_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM conversations ORDER BY created_at DESC, seq DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(self.store.pool())
        .await
        .storage_err("list recent conversations")?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(conversation) = self.get_conversation(&id).await? {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }

    /// Most recent conversations first, without turn bodies.
    pub async fn recent_summaries(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.title, c.created_at, c.quality_score,
                   (SELECT COUNT(*) FROM turns t WHERE t.conversation_id = c.id) AS turn_count
            FROM conversations c
            ORDER BY c.created_at DESC, c.seq DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.store.pool())
        .await
        .storage_err("list conversation summaries")?;

        rows.iter()
            .map(|row| {
                Ok(ConversationSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    created_at: parse_ts(&row.get::<String, _>("created_at"))?,
                    quality_score: row.get::<f64, _>("quality_score") as f32,
                    turn_count: row.get::<i64, _>("turn_count") as usize,
                })
            })
            .collect()
    }

    /// Entities of the `limit` most recent conversations, most recent
    /// first (newest conversation, latest turn, then position in the turn).
    pub async fn extract_entities_from_recent(&self, limit: usize) -> Result<Vec<Entity>> {
        sqlx::query(
            r#"
            SELECT e.conversation_id, e.turn_index, e.kind, e.literal, e.reference,
                   e.char_offset, e.timestamp
            FROM entities e
            JOIN (
                SELECT id, created_at, seq FROM conversations
                ORDER BY created_at DESC, seq DESC
                LIMIT ?1
            ) c ON c.id = e.conversation_id
            ORDER BY c.created_at DESC, c.seq DESC, e.turn_index DESC, e.char_offset ASC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.store.pool())
        .await
        .storage_err("load recent entities")?
        .iter()
        .map(row_to_entity)
        .collect()
    }

    // ── Reference resolution ──────────────────────────────────────────

    /// The recency window as of now: configured age, plus the timestamp of
    /// the N-th most recent turn.
    pub async fn recency_window(&self) -> Result<RecencyWindow> {
        let offset = self.config.recency_window_turns.saturating_sub(1) as i64;
        let cutoff: Option<String> = sqlx::query_scalar(
            "SELECT timestamp FROM turns ORDER BY timestamp DESC LIMIT 1 OFFSET ?1",
        )
        .bind(offset)
        .fetch_optional(self.store.pool())
        .await
        .storage_err("find turn window cutoff")?;

        Ok(RecencyWindow {
            max_age: Duration::minutes(self.config.recency_window_minutes),
            turn_cutoff: cutoff.as_deref().map(parse_ts).transpose()?,
        })
    }

    /// The newest stored turn as (conversation, position, content).
    async fn newest_turn(&self) -> Result<Option<(String, usize, String)>> {
        let row = sqlx::query(
            "SELECT conversation_id, position, content FROM turns
             ORDER BY timestamp DESC, position DESC LIMIT 1",
        )
        .fetch_optional(self.store.pool())
        .await
        .storage_err("load newest turn")?;
        Ok(row.map(|row| {
            (
                row.get("conversation_id"),
                row.get::<i64, _>("position") as usize,
                row.get("content"),
            )
        }))
    }

    /// Where `phrase` was written, when the newest turn contains it.
    fn anchor_in(&self, newest: Option<&(String, usize, String)>, phrase: &str) -> Option<PhraseAnchor> {
        let (conversation_id, turn_index, content) = newest?;
        let offset = self.scanner.find(content, phrase)?;
        Some(PhraseAnchor {
            conversation_id: conversation_id.clone(),
            turn_index: *turn_index,
            offset,
        })
    }

    /// Resolve a deictic phrase ("it", "that file") against recent entities.
    pub async fn resolve(&self, pronoun: &str) -> Result<Option<Entity>> {
        let entities = self
            .extract_entities_from_recent(self.config.resolution_conversations)
            .await?;
        let window = self.recency_window().await?;
        let newest = self.newest_turn().await?;
        let anchor = self.anchor_in(newest.as_ref(), pronoun);
        Ok(resolve_reference(
            pronoun,
            &entities,
            anchor.as_ref(),
            self.clock.now(),
            &window,
        ))
    }

    /// Resolve every deictic phrase found in `text`.
    pub async fn resolve_references_in(&self, text: &str) -> Result<Vec<ResolvedReference>> {
        let phrases = self.scanner.scan(text);
        if phrases.is_empty() {
            return Ok(vec![]);
        }

        let entities = self
            .extract_entities_from_recent(self.config.resolution_conversations)
            .await?;
        let window = self.recency_window().await?;
        let newest = self.newest_turn().await?;
        let now = self.clock.now();

        Ok(phrases
            .into_iter()
            .filter_map(|term| {
                let anchor = self.anchor_in(newest.as_ref(), &term);
                resolve_reference(&term, &entities, anchor.as_ref(), now, &window)
                    .map(|entity| ResolvedReference { term, entity })
            })
            .collect())
    }

    // ── Maintenance ───────────────────────────────────────────────────

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(self.store.pool())
            .await
            .storage_err("count conversations")?;
        Ok(count as usize)
    }

    /// Delete one conversation. Returns whether it existed.
    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id)
            .execute(self.store.pool())
            .await
            .storage_err("delete conversation")?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every conversation. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversations")
            .execute(self.store.pool())
            .await
            .storage_err("clear working memory")?;
        info!(removed = result.rows_affected(), "Working memory cleared");
        Ok(result.rows_affected())
    }
}

/// First non-blank user turn (or any turn), cut at a word boundary.
fn derive_title(turns: &[TurnInput]) -> String {
    let source = turns
        .iter()
        .find(|t| t.role == tiermind_core::Role::User && !t.content.trim().is_empty())
        .or_else(|| turns.iter().find(|t| !t.content.trim().is_empty()))
        .map(|t| t.content.trim())
        .unwrap_or_default();

    let first_line = source.lines().next().unwrap_or_default();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_string();
    }

    let cut: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    let trimmed = cut.rsplit_once(' ').map_or(cut.as_str(), |(head, _)| head);
    format!("{trimmed}…")
}

fn row_to_turn(row: &SqliteRow) -> Result<Turn> {
    Ok(Turn {
        position: row.get::<i64, _>("position") as usize,
        role: row.get::<String, _>("role").parse()?,
        content: row.get("content"),
        timestamp: parse_ts(&row.get::<String, _>("timestamp"))?,
    })
}

fn row_to_entity(row: &SqliteRow) -> Result<Entity> {
    Ok(Entity {
        kind: row.get::<String, _>("kind").parse()?,
        text: row.get("literal"),
        reference: row.get("reference"),
        conversation_id: row.get("conversation_id"),
        turn_index: row.get::<i64, _>("turn_index") as usize,
        offset: row.get::<i64, _>("char_offset") as usize,
        timestamp: parse_ts(&row.get::<String, _>("timestamp"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use tiermind_core::{EntityKind, ManualClock, Role};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 11, 14, 0, 0).unwrap()
    }

    async fn memory_with_clock() -> (WorkingMemory, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(start()));
        let store = TierStore::in_memory("tier1").await.unwrap();
        let memory = WorkingMemory::new(store, WorkingMemoryConfig::default(), clock.clone())
            .await
            .unwrap();
        (memory, clock)
    }

    #[tokio::test]
    async fn import_and_load() {
        let (memory, _) = memory_with_clock().await;
        let result = memory
            .import_json(
                &json!([
                    {"user": "Add a FAB button in HostControlPanel.razor"},
                    {"assistant": "Added the button."}
                ]),
                "copilot-chat",
            )
            .await
            .unwrap();

        assert_eq!(result.turns_imported, 2);
        assert_eq!(result.entities_extracted, 3);
        assert!(result.evicted.is_empty());
        assert!((0.0..=1.0).contains(&result.quality_score));

        let conversation = memory
            .get_conversation(&result.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.title, "Add a FAB button in HostControlPanel.razor");
        assert_eq!(conversation.source, "copilot-chat");
        assert_eq!(conversation.turns.len(), 2);
        assert_eq!(conversation.turns[1].role, Role::Assistant);
        assert_eq!(conversation.entities.len(), 3);
        assert!(
            conversation
                .entities
                .iter()
                .all(|e| e.timestamp <= conversation.created_at)
        );
    }

    #[tokio::test]
    async fn empty_and_blank_imports_are_rejected() {
        let (memory, _) = memory_with_clock().await;
        assert!(matches!(
            memory.import_conversation(&[], "test").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            memory
                .import_conversation(&[TurnInput::user("   ")], "test")
                .await,
            Err(Error::Validation(_))
        ));
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let (memory, _) = memory_with_clock().await;
        assert!(memory.get_conversation("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn future_turn_timestamps_are_clamped() {
        let (memory, _) = memory_with_clock().await;
        let turn = TurnInput {
            role: Role::User,
            content: "edit main.rs".into(),
            timestamp: Some(start() + Duration::hours(3)),
        };
        let result = memory.import_conversation(&[turn], "test").await.unwrap();
        let conversation = memory
            .get_conversation(&result.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.turns[0].timestamp, conversation.created_at);
        assert_eq!(conversation.entities[0].timestamp, conversation.created_at);
    }

    #[tokio::test]
    async fn twenty_first_import_evicts_the_oldest() {
        let (memory, clock) = memory_with_clock().await;
        let mut ids = Vec::new();
        for i in 0..20 {
            let result = memory
                .import_conversation(&[TurnInput::user(format!("request {i}"))], "test")
                .await
                .unwrap();
            ids.push(result.conversation_id);
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(memory.count().await.unwrap(), 20);

        let result = memory
            .import_conversation(&[TurnInput::user("request 20")], "test")
            .await
            .unwrap();
        assert_eq!(result.evicted, vec![ids[0].clone()]);
        assert_eq!(memory.count().await.unwrap(), 20);
        assert!(memory.get_conversation(&ids[0]).await.unwrap().is_none());
        assert!(memory.get_conversation(&ids[1]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn eviction_breaks_timestamp_ties_by_insertion_order() {
        let (memory, _) = memory_with_clock().await;
        let mut ids = Vec::new();
        for i in 0..21 {
            let result = memory
                .import_conversation(&[TurnInput::user(format!("same instant {i}"))], "test")
                .await
                .unwrap();
            ids.push(result.conversation_id);
        }
        assert!(memory.get_conversation(&ids[0]).await.unwrap().is_none());
        assert_eq!(memory.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn evicted_entities_are_cascaded() {
        let (memory, clock) = memory_with_clock().await;
        for i in 0..21 {
            memory
                .import_conversation(&[TurnInput::user(format!("fix file{i}.rs"))], "test")
                .await
                .unwrap();
            clock.advance(Duration::seconds(1));
        }
        let entities = memory.extract_entities_from_recent(100).await.unwrap();
        assert_eq!(entities.len(), 20);
        assert!(entities.iter().all(|e| e.reference != "file0.rs"));
        assert_eq!(entities[0].reference, "file20.rs");
    }

    #[tokio::test]
    async fn recent_conversations_newest_first() {
        let (memory, clock) = memory_with_clock().await;
        for text in ["first", "second", "third"] {
            memory
                .import_conversation(&[TurnInput::user(text)], "test")
                .await
                .unwrap();
            clock.advance(Duration::minutes(1));
        }

        let recent = memory.get_recent_conversations(2).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);

        let summaries = memory.recent_summaries(5).await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].title, "third");
        assert_eq!(summaries[0].turn_count, 1);
    }

    #[tokio::test]
    async fn it_resolves_to_fab_button() {
        let (memory, clock) = memory_with_clock().await;
        memory
            .import_conversation(
                &[TurnInput::user("Add a FAB button in HostControlPanel.razor")],
                "test",
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        memory
            .import_conversation(&[TurnInput::user("make it purple")], "test")
            .await
            .unwrap();

        let entity = memory.resolve("it").await.unwrap().unwrap();
        assert_eq!(entity.kind, EntityKind::UiElement);
        assert_eq!(entity.reference, "fab-button");
    }

    #[tokio::test]
    async fn it_resolves_across_conversations_three_minutes_later() {
        let (memory, clock) = memory_with_clock().await;
        memory
            .import_json(
                &json!([{"user": "Add a button to X"}, {"assistant": "Done"}]),
                "test",
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(3));
        memory
            .import_json(&json!([{"user": "make it purple"}]), "test")
            .await
            .unwrap();

        let entity = memory.resolve("it").await.unwrap().unwrap();
        assert_eq!(entity.kind, EntityKind::UiElement);
        assert_eq!(entity.text, "button");
        assert_eq!(entity.turn_index, 0);

        let resolved = memory.resolve_references_in("make it purple").await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].term, "it");
    }

    #[tokio::test]
    async fn nouns_after_the_pronoun_are_not_its_antecedent() {
        let (memory, clock) = memory_with_clock().await;
        memory
            .import_conversation(
                &[TurnInput::user("Add a FAB button in HostControlPanel.razor")],
                "test",
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        memory
            .import_conversation(&[TurnInput::user("make it purple to match the header")], "test")
            .await
            .unwrap();

        let entity = memory.resolve("it").await.unwrap().unwrap();
        assert_eq!(entity.reference, "fab-button");

        let resolved = memory
            .resolve_references_in("make it purple to match the header")
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].entity.reference, "fab-button");
    }

    #[tokio::test]
    async fn old_mentions_fall_out_of_the_window() {
        let (memory, clock) = memory_with_clock().await;
        memory
            .import_conversation(&[TurnInput::user("style the save button")], "test")
            .await
            .unwrap();
        // Push the mention past both the age and the turn window
        for i in 0..10 {
            clock.advance(Duration::minutes(10));
            memory
                .import_conversation(&[TurnInput::user(format!("unrelated {i}"))], "test")
                .await
                .unwrap();
        }
        assert!(memory.resolve("it").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let (memory, _) = memory_with_clock().await;
        let a = memory
            .import_conversation(&[TurnInput::user("one")], "test")
            .await
            .unwrap();
        memory
            .import_conversation(&[TurnInput::user("two")], "test")
            .await
            .unwrap();

        assert!(memory.delete_conversation(&a.conversation_id).await.unwrap());
        assert!(!memory.delete_conversation(&a.conversation_id).await.unwrap());
        assert_eq!(memory.clear().await.unwrap(), 1);
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[test]
    fn long_titles_are_cut_at_a_word() {
        let text = "Please refactor the entire authentication pipeline so that tokens refresh silently";
        let title = derive_title(&[TurnInput::user(text)]);
        assert!(title.ends_with('…'));
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
        assert!(text.starts_with(title.trim_end_matches('…')));
    }
}
