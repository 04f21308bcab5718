//! Error types for the context engine.
//!
//! Two failure classes reach callers. [`ContextError::SummarizationFailed`]
//! aborts the operation with history untouched. [`ContextError::StorageFailed`]
//! is reported but never rolls back in-memory state that already changed.
//! "Not enough history" is an outcome, not an error.

use parley_store::StoreError;
use thiserror::Error;

/// Errors produced by a [`Summarizer`](crate::Summarizer).
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// The call exceeded its deadline.
    #[error("summarizer timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The underlying call failed.
    #[error("summarizer call failed: {message}")]
    CallFailed {
        /// Error message.
        message: String,
    },

    /// The call succeeded but produced no usable text.
    #[error("summarizer returned an empty summary")]
    EmptySummary,
}

/// Errors surfaced by [`ContextManager`](crate::ContextManager) operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Summarization failed; nothing was changed.
    #[error("summarization failed: {0}")]
    SummarizationFailed(#[from] SummarizerError),

    /// A durable write or read failed.
    #[error("storage failed: {0}")]
    StorageFailed(#[from] StoreError),
}

/// Convenience type alias for context results.
pub type Result<T> = std::result::Result<T, ContextError>;
