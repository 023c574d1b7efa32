//! Working-memory domain types: conversations, turns and extracted entities.
//!
//! Conversations flow in from the caller as raw turns, get an id and a
//! quality score on import, and carry the entities mentioned in them until
//! FIFO eviction removes the whole conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The developer talking to the assistant
    User,
    /// The AI assistant
    Assistant,
    /// Injected instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Ok(Self::User),
            "assistant" | "ai" | "copilot" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(Error::validation(format!("Unknown turn role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A turn as supplied by the caller, before import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub role: Role,
    pub content: String,
    /// When the turn happened. Defaults to the import time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TurnInput {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// A stored turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Zero-based position inside the conversation
    pub position: usize,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The kind of thing an entity mention refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Class,
    Method,
    UiElement,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Method => "method",
            Self::UiElement => "ui_element",
        }
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "class" => Ok(Self::Class),
            "method" => Ok(Self::Method),
            "ui_element" | "ui-element" => Ok(Self::UiElement),
            other => Err(Error::validation(format!("Unknown entity kind: {other}"))),
        }
    }
}

/// An entity mention extracted from a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// The literal text as it appeared in the turn
    pub text: String,
    /// Normalized form used for matching (lower-cased path, kebab-cased UI name, …)
    pub reference: String,
    pub conversation_id: String,
    /// Position of the source turn within its conversation
    pub turn_index: usize,
    /// Byte offset of the mention inside the turn text
    pub offset: usize,
    pub timestamp: DateTime<Utc>,
}

/// A conversation held in working memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// Where the conversation came from (e.g. "copilot-chat", "import")
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub quality_score: f32,
    pub turns: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

impl Conversation {
    /// Timestamp of the newest turn, or creation time for an empty one.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.turns
            .iter()
            .map(|t| t.timestamp)
            .max()
            .unwrap_or(self.created_at)
    }
}

/// Outcome of `import_conversation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub conversation_id: String,
    pub quality_score: f32,
    pub turns_imported: usize,
    pub entities_extracted: usize,
    /// Conversations dropped by FIFO eviction during this import
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evicted: Vec<String>,
}

/// Parse caller-supplied turns.
///
/// Accepts either `{"role": "user", "content": "..."}` objects or the
/// shorthand `{"user": "..."}` / `{"assistant": "..."}`.
pub fn parse_turns(value: &serde_json::Value) -> Result<Vec<TurnInput>, Error> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::validation("Turns must be a JSON array"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| Error::validation(format!("Turn {i} is not an object")))?;

            if let (Some(role), Some(content)) = (obj.get("role"), obj.get("content")) {
                let role = role
                    .as_str()
                    .ok_or_else(|| Error::validation(format!("Turn {i}: role must be a string")))?
                    .parse()?;
                let content = content.as_str().ok_or_else(|| {
                    Error::validation(format!("Turn {i}: content must be a string"))
                })?;
                let timestamp = obj
                    .get("timestamp")
                    .and_then(|t| t.as_str())
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc));
                return Ok(TurnInput {
                    role,
                    content: content.to_string(),
                    timestamp,
                });
            }

            if obj.len() == 1 {
                if let Some((role, content)) = obj.iter().next() {
                    let content = content.as_str().ok_or_else(|| {
                        Error::validation(format!("Turn {i}: content must be a string"))
                    })?;
                    return Ok(TurnInput {
                        role: role.parse()?,
                        content: content.to_string(),
                        timestamp: None,
                    });
                }
            }

            Err(Error::validation(format!(
                "Turn {i} must be {{\"role\", \"content\"}} or {{\"<role>\": \"<text>\"}}"
            )))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_shorthand_turns() {
        let turns = parse_turns(&json!([
            {"user": "Add a button to X"},
            {"assistant": "Done"}
        ]))
        .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "Add a button to X");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn parse_explicit_turns_with_timestamp() {
        let turns = parse_turns(&json!([
            {"role": "user", "content": "hi", "timestamp": "2026-01-05T10:00:00Z"}
        ]))
        .unwrap();
        assert_eq!(turns[0].role, Role::User);
        assert!(turns[0].timestamp.is_some());
    }

    #[test]
    fn parse_rejects_unknown_role() {
        let err = parse_turns(&json!([{"robot": "beep"}])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn parse_rejects_non_array() {
        assert!(parse_turns(&json!({"user": "hi"})).is_err());
    }

    #[test]
    fn entity_kind_round_trip_through_str() {
        for kind in [
            EntityKind::File,
            EntityKind::Class,
            EntityKind::Method,
            EntityKind::UiElement,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }
}
