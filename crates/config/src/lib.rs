//! Configuration loading, validation, and management for tiermind.
//!
//! Loads configuration from `~/.tiermind/config.toml` with environment
//! variable overrides. Every tunable of the three tiers lives here so the
//! tier crates stay free of magic numbers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tiermind/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the tier databases live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Tier 1 settings
    #[serde(default)]
    pub working_memory: WorkingMemoryConfig,

    /// Tier 2 settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Tier 3 settings
    #[serde(default)]
    pub intelligence: IntelligenceConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pool size per tier database
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_max_connections() -> u32 {
    4
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryConfig {
    /// Conversations kept before FIFO eviction
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_recency_window_minutes")]
    pub recency_window_minutes: i64,

    #[serde(default = "default_recency_window_turns")]
    pub recency_window_turns: usize,

    /// How many recent conversations feed reference resolution
    #[serde(default = "default_resolution_conversations")]
    pub resolution_conversations: usize,
}

fn default_capacity() -> usize {
    20
}
fn default_recency_window_minutes() -> i64 {
    30
}
fn default_recency_window_turns() -> usize {
    10
}
fn default_resolution_conversations() -> usize {
    5
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            recency_window_minutes: default_recency_window_minutes(),
            recency_window_turns: default_recency_window_turns(),
            resolution_conversations: default_resolution_conversations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Days of inactivity before confidence starts to decay
    #[serde(default = "default_decay_window_days")]
    pub decay_window_days: f64,

    #[serde(default = "default_daily_decay_rate")]
    pub daily_decay_rate: f64,

    /// Higher values make frequently used patterns decay slower
    #[serde(default = "default_usage_dampening")]
    pub usage_dampening: f64,

    #[serde(default = "default_reinforcement_boost")]
    pub reinforcement_boost: f32,

    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f32,

    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f32,

    /// Score multiplier for patterns in the caller's namespace
    #[serde(default = "default_namespace_boost")]
    pub namespace_boost: f32,
}

fn default_decay_window_days() -> f64 {
    14.0
}
fn default_daily_decay_rate() -> f64 {
    0.02
}
fn default_usage_dampening() -> f64 {
    0.25
}
fn default_reinforcement_boost() -> f32 {
    0.1
}
fn default_relevance_weight() -> f32 {
    0.6
}
fn default_confidence_weight() -> f32 {
    0.4
}
fn default_namespace_boost() -> f32 {
    1.2
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            decay_window_days: default_decay_window_days(),
            daily_decay_rate: default_daily_decay_rate(),
            usage_dampening: default_usage_dampening(),
            reinforcement_boost: default_reinforcement_boost(),
            relevance_weight: default_relevance_weight(),
            confidence_weight: default_confidence_weight(),
            namespace_boost: default_namespace_boost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceConfig {
    /// Repository to analyze
    #[serde(default = "default_repo_path")]
    pub repo_path: PathBuf,

    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    /// Churn below this is STABLE
    #[serde(default = "default_churn_low")]
    pub churn_low: f64,

    /// Churn at or above this is UNSTABLE
    #[serde(default = "default_churn_high")]
    pub churn_high: f64,

    #[serde(default = "default_hotspot_warning")]
    pub hotspot_warning: f64,

    #[serde(default = "default_hotspot_error")]
    pub hotspot_error: f64,

    #[serde(default = "default_hotspot_critical")]
    pub hotspot_critical: f64,

    /// Relative velocity change treated as noise
    #[serde(default = "default_trend_noise")]
    pub trend_noise: f64,

    #[serde(default = "default_velocity_error_drop")]
    pub velocity_error_drop: f64,

    #[serde(default = "default_velocity_critical_drop")]
    pub velocity_critical_drop: f64,

    /// Commits/day below which a critical drop is reported as CRITICAL
    #[serde(default = "default_velocity_critical_floor")]
    pub velocity_critical_floor: f64,

    #[serde(default = "default_test_pass_threshold")]
    pub test_pass_threshold: f64,

    #[serde(default = "default_build_success_threshold")]
    pub build_success_threshold: f64,

    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: i64,

    #[serde(default = "default_max_analysis_secs")]
    pub max_analysis_secs: u64,

    /// Background collection
    #[serde(default = "default_true")]
    pub scheduled_collection: bool,

    #[serde(default = "default_collection_interval_minutes")]
    pub collection_interval_minutes: u64,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_window_days() -> u32 {
    30
}
fn default_churn_low() -> f64 {
    0.10
}
fn default_churn_high() -> f64 {
    0.20
}
fn default_hotspot_warning() -> f64 {
    0.20
}
fn default_hotspot_error() -> f64 {
    0.30
}
fn default_hotspot_critical() -> f64 {
    0.50
}
fn default_trend_noise() -> f64 {
    0.10
}
fn default_velocity_error_drop() -> f64 {
    0.50
}
fn default_velocity_critical_drop() -> f64 {
    0.75
}
fn default_velocity_critical_floor() -> f64 {
    0.5
}
fn default_test_pass_threshold() -> f64 {
    0.90
}
fn default_build_success_threshold() -> f64 {
    0.80
}
fn default_cache_ttl_minutes() -> i64 {
    60
}
fn default_max_analysis_secs() -> u64 {
    30
}
fn default_collection_interval_minutes() -> u64 {
    60
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
            default_window_days: default_window_days(),
            churn_low: default_churn_low(),
            churn_high: default_churn_high(),
            hotspot_warning: default_hotspot_warning(),
            hotspot_error: default_hotspot_error(),
            hotspot_critical: default_hotspot_critical(),
            trend_noise: default_trend_noise(),
            velocity_error_drop: default_velocity_error_drop(),
            velocity_critical_drop: default_velocity_critical_drop(),
            velocity_critical_floor: default_velocity_critical_floor(),
            test_pass_threshold: default_test_pass_threshold(),
            build_success_threshold: default_build_success_threshold(),
            cache_ttl_minutes: default_cache_ttl_minutes(),
            max_analysis_secs: default_max_analysis_secs(),
            scheduled_collection: true,
            collection_interval_minutes: default_collection_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,

    /// Per-tier query deadline
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,

    #[serde(default = "default_performance_target_ms")]
    pub performance_target_ms: u64,

    #[serde(default = "default_recent_conversations")]
    pub recent_conversations: usize,

    #[serde(default = "default_active_turns")]
    pub active_turns: usize,

    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,

    #[serde(default = "default_max_hotspots")]
    pub max_hotspots: usize,
}

fn default_token_budget() -> usize {
    4_000
}
fn default_tier_timeout_ms() -> u64 {
    150
}
fn default_performance_target_ms() -> u64 {
    200
}
fn default_recent_conversations() -> usize {
    3
}
fn default_active_turns() -> usize {
    6
}
fn default_max_entities() -> usize {
    15
}
fn default_max_patterns() -> usize {
    5
}
fn default_max_hotspots() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_token_budget: default_token_budget(),
            tier_timeout_ms: default_tier_timeout_ms(),
            performance_target_ms: default_performance_target_ms(),
            recent_conversations: default_recent_conversations(),
            active_turns: default_active_turns(),
            max_entities: default_max_entities(),
            max_patterns: default_max_patterns(),
            max_hotspots: default_max_hotspots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when neither `TIERMIND_LOG` nor `RUST_LOG` is set
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tiermind/config.toml),
    /// then apply environment overrides:
    /// - `TIERMIND_DATA_DIR`
    /// - `TIERMIND_REPO_PATH`
    /// - `TIERMIND_LOG`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TIERMIND_DATA_DIR").filter(|v| !v.is_empty()) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(repo) = lookup("TIERMIND_REPO_PATH").filter(|v| !v.is_empty()) {
            self.intelligence.repo_path = PathBuf::from(repo);
        }
        if let Some(level) = lookup("TIERMIND_LOG").filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tiermind")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "storage.max_connections must be > 0".into(),
            ));
        }

        let wm = &self.working_memory;
        if wm.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "working_memory.capacity must be > 0".into(),
            ));
        }
        if wm.recency_window_minutes < 0 {
            return Err(ConfigError::ValidationError(
                "working_memory.recency_window_minutes must be >= 0".into(),
            ));
        }

        let kg = &self.knowledge;
        if kg.decay_window_days < 0.0 || kg.daily_decay_rate < 0.0 || kg.usage_dampening < 0.0 {
            return Err(ConfigError::ValidationError(
                "knowledge decay settings must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&kg.reinforcement_boost) {
            return Err(ConfigError::ValidationError(
                "knowledge.reinforcement_boost must be between 0.0 and 1.0".into(),
            ));
        }
        if kg.relevance_weight < 0.0
            || kg.confidence_weight < 0.0
            || kg.relevance_weight + kg.confidence_weight <= 0.0
        {
            return Err(ConfigError::ValidationError(
                "relevance_weight + confidence_weight must be > 0".into(),
            ));
        }

        let ci = &self.intelligence;
        if !(0.0 < ci.churn_low && ci.churn_low < ci.churn_high && ci.churn_high <= 1.0) {
            return Err(ConfigError::ValidationError(
                "intelligence churn thresholds must satisfy 0 < churn_low < churn_high <= 1".into(),
            ));
        }
        if !(ci.hotspot_warning <= ci.hotspot_error && ci.hotspot_error <= ci.hotspot_critical) {
            return Err(ConfigError::ValidationError(
                "hotspot severity thresholds must be ascending".into(),
            ));
        }
        if ci.velocity_error_drop > ci.velocity_critical_drop {
            return Err(ConfigError::ValidationError(
                "velocity_error_drop must not exceed velocity_critical_drop".into(),
            ));
        }
        for (name, value) in [
            ("test_pass_threshold", ci.test_pass_threshold),
            ("build_success_threshold", ci.build_success_threshold),
            ("trend_noise", ci.trend_noise),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "intelligence.{name} must be between 0.0 and 1.0"
                )));
            }
        }
        if ci.default_window_days == 0 || ci.max_analysis_secs == 0 {
            return Err(ConfigError::ValidationError(
                "intelligence window and analysis deadline must be > 0".into(),
            ));
        }

        if self.context.default_token_budget == 0 || self.context.tier_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "context token budget and tier timeout must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for tiermind_core::Error {
    fn from(e: ConfigError) -> Self {
        tiermind_core::Error::Config {
            message: e.to_string(),
        }
    }
}
