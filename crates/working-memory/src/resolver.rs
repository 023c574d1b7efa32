//! Deictic reference resolution ("it", "that file", "this button").

use chrono::{DateTime, Duration, Utc};
use regex_lite::Regex;
use tiermind_core::{Entity, EntityKind, Error};

use crate::entities::UI_NOUNS;

/// Which entities are recent enough to be referred to.
///
/// An entity qualifies if it is younger than `max_age`, or if its turn is
/// at or after `turn_cutoff` (the timestamp of the N-th most recent turn).
/// A `None` cutoff means fewer than N turns exist, so every turn qualifies.
#[derive(Debug, Clone, Copy)]
pub struct RecencyWindow {
    pub max_age: Duration,
    pub turn_cutoff: Option<DateTime<Utc>>,
}

impl RecencyWindow {
    pub fn contains(&self, entity: &Entity, now: DateTime<Utc>) -> bool {
        if now - entity.timestamp <= self.max_age {
            return true;
        }
        match self.turn_cutoff {
            Some(cutoff) => entity.timestamp >= cutoff,
            None => true,
        }
    }
}

/// Where a deictic phrase was itself written. Entities at or after it in
/// the same turn come later in the sentence and cannot be its antecedent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseAnchor {
    pub conversation_id: String,
    pub turn_index: usize,
    pub offset: usize,
}

impl PhraseAnchor {
    pub fn excludes(&self, entity: &Entity) -> bool {
        entity.conversation_id == self.conversation_id
            && entity.turn_index == self.turn_index
            && entity.offset >= self.offset
    }
}

/// The kind a deictic phrase points at, if it names one.
pub fn kind_hint(phrase: &str) -> Option<EntityKind> {
    let last = phrase.split_whitespace().last()?.to_lowercase();
    noun_kind(&last).or_else(|| last.strip_suffix('s').and_then(noun_kind))
}

fn noun_kind(noun: &str) -> Option<EntityKind> {
    match noun {
        "file" | "path" => Some(EntityKind::File),
        "class" | "component" | "type" => Some(EntityKind::Class),
        "method" | "function" => Some(EntityKind::Method),
        n if UI_NOUNS.contains(&n) => Some(EntityKind::UiElement),
        _ => None,
    }
}

/// Preference between kinds mentioned in the same turn when the phrase
/// gives no hint.
fn bare_pronoun_rank(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::UiElement => 0,
        EntityKind::Method => 1,
        EntityKind::Class => 2,
        EntityKind::File => 3,
    }
}

/// Resolve a deictic phrase against recent entities.
///
/// `recent_entities` must be ordered most recent first (newest
/// conversation, latest turn, then position in the turn). The newest
/// in-window candidate of a compatible kind wins; within one turn a bare
/// pronoun prefers UI elements, then methods, classes and files.
pub fn resolve_reference(
    pronoun: &str,
    recent_entities: &[Entity],
    anchor: Option<&PhraseAnchor>,
    now: DateTime<Utc>,
    window: &RecencyWindow,
) -> Option<Entity> {
    let hint = kind_hint(pronoun);

    let mut candidates: Vec<&Entity> = recent_entities
        .iter()
        .filter(|e| hint.is_none_or(|k| e.kind == k))
        .filter(|e| !anchor.is_some_and(|a| a.excludes(e)))
        .filter(|e| window.contains(e, now))
        .collect();
    // Stable: input order breaks timestamp ties
    candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let newest = candidates.first()?;
    let (conversation, turn) = (newest.conversation_id.clone(), newest.turn_index);

    candidates
        .into_iter()
        .filter(|e| e.conversation_id == conversation && e.turn_index == turn)
        .min_by(|a, b| {
            let rank = |e: &Entity| {
                if hint.is_none() {
                    bare_pronoun_rank(e.kind)
                } else {
                    0
                }
            };
            rank(a).cmp(&rank(b)).then(a.offset.cmp(&b.offset))
        })
        .cloned()
}

/// Finds deictic phrases in free text.
#[derive(Debug)]
pub struct DeicticScanner {
    pattern: Regex,
}

impl DeicticScanner {
    pub fn new() -> Result<Self, Error> {
        let nouns = format!(
            "{}|file|path|class|component|method|function",
            UI_NOUNS.join("|")
        );
        let pattern = format!(r"(?i)\b(?:(?:this|that|the|these|those)\s+(?:{nouns})s?|it|this|that)\b");
        let pattern = Regex::new(&pattern)
            .map_err(|e| Error::Internal(format!("Invalid deictic pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Byte offset of the first deictic match of `phrase` in `text`.
    pub fn find(&self, text: &str, phrase: &str) -> Option<usize> {
        self.pattern
            .find_iter(text)
            .find(|m| m.as_str().eq_ignore_ascii_case(phrase))
            .map(|m| m.start())
    }

    /// Phrases in order of appearance, duplicates removed.
    pub fn scan(&self, text: &str) -> Vec<String> {
        let mut phrases: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(text) {
            let phrase = m.as_str().to_lowercase();
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
        }
        phrases
    }
}
