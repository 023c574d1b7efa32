//! Knowledge-graph domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// What kind of reusable knowledge a pattern captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// A multi-step way of getting something done
    Workflow,
    /// A fix or implementation that worked before
    Solution,
    /// A mistake the assistant was corrected on
    Correction,
    /// A stated developer preference
    Preference,
    /// A structural convention of the codebase
    Architecture,
    /// A check that should run before declaring work done
    Validation,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Solution => "solution",
            Self::Correction => "correction",
            Self::Preference => "preference",
            Self::Architecture => "architecture",
            Self::Validation => "validation",
        }
    }
}

impl FromStr for PatternType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow" => Ok(Self::Workflow),
            "solution" => Ok(Self::Solution),
            "correction" => Ok(Self::Correction),
            "preference" => Ok(Self::Preference),
            "architecture" => Ok(Self::Architecture),
            "validation" => Ok(Self::Validation),
            other => Err(Error::validation(format!("Unknown pattern type: {other}"))),
        }
    }
}

/// Whether a pattern applies everywhere or to one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    #[default]
    Generic,
    Application,
}

impl PatternScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Application => "application",
        }
    }
}

impl FromStr for PatternScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(Self::Generic),
            "application" => Ok(Self::Application),
            other => Err(Error::validation(format!("Unknown pattern scope: {other}"))),
        }
    }
}

/// A stored pattern.
///
/// `confidence` is the decayed value at read time; `stored_confidence` is
/// what was last written by creation or reinforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pattern_type: PatternType,
    pub confidence: f32,
    #[serde(skip)]
    pub stored_confidence: f32,
    pub scope: PatternScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Blended search score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

/// Input for `store_pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPattern {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pattern_type: PatternType,
    pub confidence: f32,
    #[serde(default)]
    pub scope: PatternScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NewPattern {
    /// A generic-scope pattern with no namespace or metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        pattern_type: PatternType,
        confidence: f32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            pattern_type,
            confidence,
            scope: PatternScope::Generic,
            namespace: None,
            metadata: None,
        }
    }

    pub fn with_scope(mut self, scope: PatternScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// A pattern search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PatternScope>,
    /// Namespace detected from the caller's current file; matching
    /// patterns get a ranking boost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_hint: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: None,
            namespace_hint: None,
            limit: default_limit(),
        }
    }
}
