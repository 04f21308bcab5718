//! Memory slot repository: upsert/read/delete of the single
//! `previous_dialog_summary` row in `memory_slot`.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::parse_timestamp;
use crate::errors::Result;
use crate::types::{MEMORY_SLOT_KEY, MemorySlot, MemorySource};

/// Memory slot repository.
pub struct MemorySlotRepo;

impl MemorySlotRepo {
    /// Read the slot, if present.
    pub fn get(conn: &Connection) -> Result<Option<MemorySlot>> {
        let slot = conn
            .query_row(
                "SELECT text, source, updated_at FROM memory_slot WHERE key = ?1",
                params![MEMORY_SLOT_KEY],
                row_to_slot,
            )
            .optional()?;
        Ok(slot)
    }

    /// Insert or overwrite the slot.
    pub fn upsert(
        conn: &Connection,
        text: &str,
        source: MemorySource,
        updated_at: DateTime<Utc>,
    ) -> Result<MemorySlot> {
        let _ = conn.execute(
            "INSERT INTO memory_slot (key, text, source, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
               text = excluded.text,
               source = excluded.source,
               updated_at = excluded.updated_at",
            params![MEMORY_SLOT_KEY, text, source.as_str(), updated_at.to_rfc3339()],
        )?;
        Ok(MemorySlot {
            text: text.to_owned(),
            updated_at,
            source,
        })
    }

    /// Delete the slot. Returns whether a row existed.
    pub fn delete(conn: &Connection) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM memory_slot WHERE key = ?1",
            params![MEMORY_SLOT_KEY],
        )?;
        Ok(changed > 0)
    }
}

fn row_to_slot(row: &Row<'_>) -> rusqlite::Result<MemorySlot> {
    let text: String = row.get(0)?;
    let raw_source: String = row.get(1)?;
    let raw_updated: String = row.get(2)?;
    let source = raw_source.parse::<MemorySource>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
    })?;
    Ok(MemorySlot {
        text,
        updated_at: parse_timestamp(2, &raw_updated)?,
        source,
    })
}
