//! One SQLite database per tier.

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tiermind_core::{Error, StorageError};
use tracing::{debug, info};

/// Pool settings for a tier database.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A named, idempotent schema statement.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(name: &'static str, sql: &'static str) -> Self {
        Self { name, sql }
    }
}

/// A tier's database handle.
#[derive(Debug, Clone)]
pub struct TierStore {
    pool: SqlitePool,
    label: &'static str,
}

impl TierStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(
        path: &Path,
        label: &'static str,
        options: &StoreOptions,
    ) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(StorageError::Connection(format!(
                    "Cannot create {}: {e}",
                    parent.display()
                )))
            })?;
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::Connection(format!(
                    "Failed to open {label} database at {}: {e}",
                    path.display()
                )))
            })?;

        info!(tier = label, path = %path.display(), "Tier database opened");
        Ok(Self { pool, label })
    }

    /// An ephemeral database that lives as long as the store.
    ///
    /// Uses a single connection that never expires, so every query sees the
    /// same in-memory database.
    pub async fn in_memory(label: &'static str) -> Result<Self, Error> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                Error::Storage(StorageError::Connection(format!(
                    "Invalid SQLite path: {e}"
                )))
            })?
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::Connection(format!(
                    "Failed to open in-memory {label} database: {e}"
                )))
            })?;

        debug!(tier = label, "In-memory tier database opened");
        Ok(Self { pool, label })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool, label: &'static str) -> Self {
        Self { pool, label }
    }

    /// Apply schema statements in order.
    pub async fn migrate(&self, migrations: &[Migration]) -> Result<(), Error> {
        for migration in migrations {
            sqlx::query(migration.sql)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Storage(StorageError::MigrationFailed(format!(
                        "{} / {}: {e}",
                        self.label, migration.name
                    )))
                })?;
            debug!(tier = self.label, migration = migration.name, "Migration applied");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Cheap liveness probe.
    pub async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::Connection(format!(
                    "{} database unreachable: {e}",
                    self.label
                )))
            })?;
        Ok(())
    }

    /// Close the pool. Further queries fail with a connection error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
