//! Error types for inventory operations.

use thiserror::Error;

/// Errors from inventory operations.
///
/// `Locked` is the only transient kind: another writer holds the database
/// and the same operation may succeed if retried. Every other kind is
/// permanent for the operation that produced it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Inventory locked by another writer: {0}")]
    Locked(String),

    #[error("No partition registered for network {0}")]
    UnknownNetwork(String),

    #[error("Invalid partition name {name:?} for network {network}")]
    InvalidPartition { network: String, name: String },

    #[error("Corrupt {field} in stored record {key}: {detail}")]
    Corrupt {
        key: String,
        field: &'static str,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref().is_some_and(is_busy_code) => {
                Self::Locked(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Locked("timed out acquiring a connection".into()),
            _ => Self::Database(e),
        }
    }
}

/// SQLite reports contention as SQLITE_BUSY (5) or SQLITE_LOCKED (6); the
/// extended codes keep the primary code in the low byte.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

pub type Result<T> = std::result::Result<T, StoreError>;
