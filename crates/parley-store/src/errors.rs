//! Error types for the storage layer.

use thiserror::Error;

/// Errors returned by [`MemoryStore`](crate::MemoryStore) and
/// [`PendingTurnLog`](crate::PendingTurnLog) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// Filesystem error (creating the database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (e.g. injected failure, poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for storage results.
pub type Result<T> = std::result::Result<T, StoreError>;
