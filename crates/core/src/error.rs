//! Error types for the tiermind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Storage failures have their own bounded-context enum; everything else
//! is a variant of the top-level [`Error`].

use thiserror::Error;

/// The top-level error type for all tiermind operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input errors ---
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Source control ---
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Git command failed: {0}")]
    Git(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the failure means the tier cannot serve requests at all
    /// (as opposed to a rejected input).
    pub fn is_unavailability(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::RepositoryUnavailable(_) | Self::Git(_)
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}
