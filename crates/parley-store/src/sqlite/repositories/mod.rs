//! Stateless repositories. Every method takes `&Connection` and runs a single
//! statement, so each operation is atomic on its own.

pub mod memory_slot;
pub mod pending_turn;

pub use memory_slot::MemorySlotRepo;
pub use pending_turn::PendingTurnRepo;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

/// Parse an RFC 3339 column into a UTC timestamp.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
