//! The durable single-slot summary store.
//!
//! [`MemoryStore`] holds at most one [`MemorySlot`]. Writes are last-writer-wins
//! upserts. Every successful `save`/`clear` is pushed to observers through a
//! `watch` channel, and [`MemoryStore::observe`] yields the current value first.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::errors::Result;
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::MemorySlotRepo;
use crate::types::{MemorySlot, MemorySource};

/// Durable storage for the cross-session summary.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Current slot. `None` is the normal state before any summary exists.
    async fn get(&self) -> Result<Option<MemorySlot>>;

    /// Upsert the slot, stamping `updated_at = now`.
    async fn save(&self, text: &str, source: MemorySource) -> Result<MemorySlot>;

    /// Delete the slot. Succeeds when nothing is stored.
    async fn clear(&self) -> Result<()>;

    /// Stream of slot values, starting with the current one.
    fn observe(&self) -> WatchStream<Option<MemorySlot>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// [`MemoryStore`] backed by the `memory_slot` table.
pub struct SqliteMemoryStore {
    pool: ConnectionPool,
    tx: watch::Sender<Option<MemorySlot>>,
}

impl SqliteMemoryStore {
    /// Wrap a migrated pool. Reads the current slot to seed observers.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        let current = {
            let conn = pool.get()?;
            MemorySlotRepo::get(&conn)?
        };
        let (tx, _rx) = watch::channel(current);
        Ok(Self { pool, tx })
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get(&self) -> Result<Option<MemorySlot>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            MemorySlotRepo::get(&conn)
        })
        .await?
    }

    async fn save(&self, text: &str, source: MemorySource) -> Result<MemorySlot> {
        let pool = self.pool.clone();
        let text = text.to_owned();
        let slot = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            MemorySlotRepo::upsert(&conn, &text, source, Utc::now())
        })
        .await??;
        debug!(source = %source, chars = slot.text.len(), "memory slot saved");
        let _ = self.tx.send_replace(Some(slot.clone()));
        Ok(slot)
    }

    async fn clear(&self) -> Result<()> {
        let pool = self.pool.clone();
        let existed = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            MemorySlotRepo::delete(&conn)
        })
        .await??;
        debug!(existed, "memory slot cleared");
        let _ = self.tx.send_replace(None);
        Ok(())
    }

    fn observe(&self) -> WatchStream<Option<MemorySlot>> {
        WatchStream::new(self.tx.subscribe())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Non-durable [`MemoryStore`]. The watch channel itself holds the value.
pub struct InMemoryMemoryStore {
    tx: watch::Sender<Option<MemorySlot>>,
}

impl InMemoryMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Store pre-populated with `text`.
    pub fn with_slot(text: &str, source: MemorySource) -> Self {
        let (tx, _rx) = watch::channel(Some(MemorySlot {
            text: text.to_owned(),
            updated_at: Utc::now(),
            source,
        }));
        Self { tx }
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self) -> Result<Option<MemorySlot>> {
        Ok(self.tx.borrow().clone())
    }

    async fn save(&self, text: &str, source: MemorySource) -> Result<MemorySlot> {
        let slot = MemorySlot {
            text: text.to_owned(),
            updated_at: Utc::now(),
            source,
        };
        let _ = self.tx.send_replace(Some(slot.clone()));
        Ok(slot)
    }

    async fn clear(&self) -> Result<()> {
        let _ = self.tx.send_replace(None);
        Ok(())
    }

    fn observe(&self) -> WatchStream<Option<MemorySlot>> {
        WatchStream::new(self.tx.subscribe())
    }
}
