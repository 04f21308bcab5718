//! # parley-store
//!
//! Durable state that must outlive the process:
//!
//! - [`MemoryStore`]: the single cross-session summary slot
//!   (`previous_dialog_summary`) with a push stream of changes
//! - [`PendingTurnLog`]: append/remove/clear journal of user turns that have not yet
//!   been folded into a summary, replayed by crash recovery
//!
//! Both traits have a `SQLite` implementation (WAL mode, `r2d2` pool, versioned
//! migrations) and an in-memory implementation for tests and ephemeral use.
//! Stores never retry. Every I/O failure surfaces as a [`StoreError`].

#![deny(unsafe_code)]

pub mod errors;
pub mod memory_store;
pub mod pending_log;
pub mod sqlite;
pub mod types;

pub use errors::{Result, StoreError};
pub use memory_store::{InMemoryMemoryStore, MemoryStore, SqliteMemoryStore};
pub use pending_log::{InMemoryPendingTurnLog, PendingTurnLog, SqlitePendingTurnLog};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool};
pub use types::{MEMORY_SLOT_KEY, MemorySlot, MemorySource, PendingTurn};
