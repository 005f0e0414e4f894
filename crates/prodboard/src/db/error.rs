//! Database error types.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from the connection pool and the query executor.
#[derive(Error, Debug)]
pub enum DbError {
    /// No connection became available before the acquire timeout.
    #[error("Connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// The pool is draining and accepts no new acquisitions.
    #[error("Connection pool is draining")]
    Draining,

    /// The backing store could not be reached or dropped the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backing store rejected the operation.
    #[error("Operation rejected by store (code {code}): {message}")]
    Operation { code: i32, message: String },

    /// Parameters did not match the operation's declared shape.
    #[error("Invalid parameters for '{operation}': {reason}")]
    Validation { operation: String, reason: String },

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The pool lock was poisoned.
    #[error("Connection pool lock poisoned")]
    LockPoisoned,
}

impl DbError {
    /// Transient failures are worth retrying with a fresh connection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::PoolExhausted { .. } | DbError::Draining | DbError::Connection(_)
        )
    }

    pub(crate) fn validation(operation: &str, reason: impl Into<String>) -> Self {
        DbError::Validation {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                match failure.code {
                    ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::FileLockingProtocolFailed
                    | ErrorCode::PermissionDenied => DbError::Connection(message),
                    _ => DbError::Operation {
                        code: failure.extended_code,
                        message,
                    },
                }
            }
            other => DbError::Operation {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}
