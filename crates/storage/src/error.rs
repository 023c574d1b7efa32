//! Mapping from `sqlx` errors into the domain error.

use tiermind_core::{Error, StorageError};

/// Convert a `sqlx` error, tagging it with what was being attempted.
pub fn map_sqlx_error(context: &str, e: sqlx::Error) -> Error {
    let storage = match &e {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            StorageError::Constraint(format!("{context}: {db}"))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Connection(format!("{context}: {e}"))
        }
        _ => StorageError::QueryFailed(format!("{context}: {e}")),
    };
    Error::Storage(storage)
}

/// `.storage_err("...")` on any `sqlx` result.
pub trait SqlxResultExt<T> {
    fn storage_err(self, context: &str) -> Result<T, Error>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn storage_err(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| map_sqlx_error(context, e))
    }
}
