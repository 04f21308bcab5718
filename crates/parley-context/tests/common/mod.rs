//! Shared fixtures for context integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_context::{
    CompactionPolicy, ContextManager, ContextManagerConfig, KeywordSummarizer, Summarizer,
    SummarizerError, SummaryOutput,
};
use parley_core::{RetryConfig, Turn};
use parley_store::{
    ConnectionConfig, InMemoryMemoryStore, InMemoryPendingTurnLog, MemorySlot, MemorySource,
    MemoryStore, PendingTurn, PendingTurnLog, SqliteMemoryStore, SqlitePendingTurnLog, StoreError,
};
use tokio_stream::wrappers::WatchStream;

// ─── Summarizers ─────────────────────────────────────────────────────────────

/// Records every input and answers with the keyword summary.
#[derive(Default)]
pub struct RecordingSummarizer {
    calls: Mutex<Vec<Vec<Turn>>>,
    fail: AtomicBool,
}

impl RecordingSummarizer {
    pub fn failing() -> Self {
        let summarizer = Self::default();
        summarizer.set_failing(true);
        summarizer
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize(&self, turns: &[Turn]) -> Result<SummaryOutput, SummarizerError> {
        self.calls.lock().unwrap().push(turns.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SummarizerError::CallFailed {
                message: "provider unavailable".into(),
            });
        }
        Ok(SummaryOutput {
            summary_text: KeywordSummarizer.summarize_now(turns),
            input_tokens_used: 50,
            output_tokens_used: 8,
        })
    }
}

// ─── Stores ──────────────────────────────────────────────────────────────────

/// Wraps an in-memory store and fails the next `failures` saves.
#[derive(Default)]
pub struct FlakyMemoryStore {
    inner: InMemoryMemoryStore,
    failures: AtomicUsize,
    save_attempts: AtomicUsize,
    fail_reads: AtomicBool,
}

impl FlakyMemoryStore {
    pub fn failing_saves(failures: usize) -> Self {
        let store = Self::default();
        store.failures.store(failures, Ordering::SeqCst);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryStore for FlakyMemoryStore {
    async fn get(&self) -> parley_store::Result<Option<MemorySlot>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("read failed".into()));
        }
        self.inner.get().await
    }

    async fn save(&self, text: &str, source: MemorySource) -> parley_store::Result<MemorySlot> {
        let _ = self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Internal("disk full".into()));
        }
        self.inner.save(text, source).await
    }

    async fn clear(&self) -> parley_store::Result<()> {
        self.inner.clear().await
    }

    fn observe(&self) -> WatchStream<Option<MemorySlot>> {
        self.inner.observe()
    }
}

/// Pending log whose appends can be made to fail.
#[derive(Default)]
pub struct FailingPendingLog {
    inner: InMemoryPendingTurnLog,
    fail_appends: AtomicBool,
}

impl FailingPendingLog {
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PendingTurnLog for FailingPendingLog {
    async fn append(&self, text: &str) -> parley_store::Result<i64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("journal unavailable".into()));
        }
        self.inner.append(text).await
    }

    async fn read_all(&self) -> parley_store::Result<Vec<PendingTurn>> {
        self.inner.read_all().await
    }

    async fn remove(&self, seqs: &[i64]) -> parley_store::Result<()> {
        self.inner.remove(seqs).await
    }

    async fn clear(&self) -> parley_store::Result<()> {
        self.inner.clear().await
    }
}

// ─── Builders ────────────────────────────────────────────────────────────────

pub fn config(threshold: usize, keep: usize, memory_enabled: bool) -> ContextManagerConfig {
    ContextManagerConfig {
        policy: CompactionPolicy {
            enabled: true,
            trigger_threshold: threshold,
            keep_recent_count: keep,
        },
        memory_enabled,
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        },
        ..ContextManagerConfig::default()
    }
}

/// A manager over `SQLite` files at `path`, as a fresh process would open it.
pub fn sqlite_manager(
    path: &Path,
    config: ContextManagerConfig,
    summarizer: Arc<dyn Summarizer>,
) -> (ContextManager, Arc<SqliteMemoryStore>, Arc<SqlitePendingTurnLog>) {
    let pool = parley_store::sqlite::open_file(path, &ConnectionConfig::default()).unwrap();
    let memory = Arc::new(SqliteMemoryStore::new(pool.clone()).unwrap());
    let log = Arc::new(SqlitePendingTurnLog::new(pool));
    let manager = ContextManager::new(config, memory.clone(), log.clone(), summarizer);
    (manager, memory, log)
}

pub async fn pending_texts(log: &dyn PendingTurnLog) -> Vec<String> {
    log.read_all()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.text)
        .collect()
}

/// Alternate user and assistant turns, `pairs` times.
pub async fn converse(manager: &ContextManager, pairs: usize, tag: &str) {
    for i in 0..pairs {
        manager
            .append_user_turn(&format!("{tag} question {i}"))
            .await
            .unwrap();
        manager
            .append_assistant_turn(&format!("{tag} answer {i}"), 40, 12)
            .await;
    }
}
