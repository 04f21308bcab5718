//! Crash-recovery journal of user turns.
//!
//! Entries are appended before the turn is sent to a provider and removed, by
//! sequence number, once a summary covering them has been durably saved.
//! Entries no summary has covered yet stay put. Single writer, single consumer.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;

use crate::errors::Result;
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::PendingTurnRepo;
use crate::types::PendingTurn;

/// Durable journal of not-yet-summarized user turns, keyed by sequence number.
#[async_trait]
pub trait PendingTurnLog: Send + Sync {
    /// Append one user turn. Durable when this returns `Ok`.
    ///
    /// Returns the entry's sequence number, which increases with every append.
    async fn append(&self, text: &str) -> Result<i64>;

    /// All entries in append order. Empty when nothing is pending.
    async fn read_all(&self) -> Result<Vec<PendingTurn>>;

    /// Remove the entries with the given sequence numbers.
    ///
    /// Unknown numbers are ignored, so removing twice is harmless.
    async fn remove(&self, seqs: &[i64]) -> Result<()>;

    /// Remove every entry. Succeeds on an empty log.
    async fn clear(&self) -> Result<()>;
}

/// [`PendingTurnLog`] backed by the `pending_turns` table.
pub struct SqlitePendingTurnLog {
    pool: ConnectionPool,
}

impl SqlitePendingTurnLog {
    /// Wrap a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingTurnLog for SqlitePendingTurnLog {
    async fn append(&self, text: &str) -> Result<i64> {
        let pool = self.pool.clone();
        let text = text.to_owned();
        let seq = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            PendingTurnRepo::append(&conn, &text, Utc::now())
        })
        .await??;
        trace!(seq, "pending turn journaled");
        Ok(seq)
    }

    async fn read_all(&self) -> Result<Vec<PendingTurn>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            PendingTurnRepo::list(&conn)
        })
        .await?
    }

    async fn remove(&self, seqs: &[i64]) -> Result<()> {
        if seqs.is_empty() {
            return Ok(());
        }
        let pool = self.pool.clone();
        let seqs = seqs.to_vec();
        let removed = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            PendingTurnRepo::remove(&conn, &seqs)
        })
        .await??;
        trace!(removed, "pending turns removed");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let pool = self.pool.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            PendingTurnRepo::clear(&conn)
        })
        .await??;
        trace!(removed, "pending log cleared");
        Ok(())
    }
}

/// Non-durable [`PendingTurnLog`].
#[derive(Default)]
pub struct InMemoryPendingTurnLog {
    inner: Mutex<Journal>,
}

#[derive(Default)]
struct Journal {
    entries: Vec<PendingTurn>,
    last_seq: i64,
}

impl Journal {
    fn push(&mut self, text: String) -> i64 {
        self.last_seq += 1;
        self.entries.push(PendingTurn {
            seq: self.last_seq,
            text,
            created_at: Utc::now(),
        });
        self.last_seq
    }
}

impl InMemoryPendingTurnLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log pre-populated with `texts`, as if left behind by a crashed process.
    pub fn with_entries<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let log = Self::new();
        {
            let mut journal = log.lock();
            for text in texts {
                let _ = journal.push(text.into());
            }
        }
        log
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PendingTurnLog for InMemoryPendingTurnLog {
    async fn append(&self, text: &str) -> Result<i64> {
        Ok(self.lock().push(text.to_owned()))
    }

    async fn read_all(&self) -> Result<Vec<PendingTurn>> {
        Ok(self.lock().entries.clone())
    }

    async fn remove(&self, seqs: &[i64]) -> Result<()> {
        self.lock().entries.retain(|entry| !seqs.contains(&entry.seq));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock().entries.clear();
        Ok(())
    }
}
