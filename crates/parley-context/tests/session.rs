//! Ending sessions and managing memory.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use parley_context::{
    ContextError, ContextManager, ProviderProfile, SessionEndOutcome, SummaryEncoding,
};
use parley_store::{InMemoryPendingTurnLog, MemorySource, MemoryStore};

use common::{FailingPendingLog, FlakyMemoryStore, RecordingSummarizer, config, pending_texts};

fn manager_with(
    memory: Arc<FlakyMemoryStore>,
    log: Arc<InMemoryPendingTurnLog>,
    summarizer: Arc<RecordingSummarizer>,
) -> ContextManager {
    ContextManager::new(config(20, 4, true), memory, log, summarizer)
}

#[tokio::test]
async fn session_summary_uses_only_user_turns() {
    let memory = Arc::new(FlakyMemoryStore::default());
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let summarizer = Arc::new(RecordingSummarizer::default());
    let manager = manager_with(memory.clone(), log.clone(), summarizer.clone());
    let _ = manager.recover().await;
    common::converse(&manager, 4, "s").await;

    let outcome = manager.clear_session(true).await;
    assert_matches!(outcome, SessionEndOutcome::Saved { user_turns: 4 });
    assert_eq!(memory.save_attempts(), 1);

    let input = &summarizer.calls()[0];
    assert_eq!(input.len(), 4);
    assert!(input.iter().all(parley_core::Turn::is_user));
    let slot = memory.get().await.unwrap().unwrap();
    assert_eq!(slot.source, MemorySource::SessionEnd);
    assert!(!slot.text.contains("answer"));
    assert!(pending_texts(log.as_ref()).await.is_empty());
}

#[tokio::test]
async fn session_summary_includes_folded_system_summary() {
    let memory = Arc::new(FlakyMemoryStore::default());
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let summarizer = Arc::new(RecordingSummarizer::default());
    let mut cfg = config(4, 0, true);
    cfg.provider = ProviderProfile::new("local", SummaryEncoding::SystemInstruction);
    let manager = ContextManager::new(cfg, memory.clone(), log, summarizer.clone());

    common::converse(&manager, 2, "old").await;
    assert!(manager.maybe_auto_compact().await.unwrap().is_compacted());
    manager.append_user_turn("new topic").await.unwrap();

    assert_matches!(
        manager.clear_session(true).await,
        SessionEndOutcome::Saved { user_turns: 1 }
    );
    let input = &summarizer.calls()[1];
    assert_eq!(input.len(), 2);
    assert!(input[0].text().contains("old question 0"));
    assert_eq!(input[1].text(), "new topic");
}

#[tokio::test]
async fn failed_session_summary_keeps_log() {
    let memory = Arc::new(FlakyMemoryStore::failing_saves(10));
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let manager = manager_with(
        memory.clone(),
        log.clone(),
        Arc::new(RecordingSummarizer::default()),
    );
    common::converse(&manager, 2, "k").await;

    assert_matches!(
        manager.clear_session(true).await,
        SessionEndOutcome::Failed {
            error: ContextError::StorageFailed(_)
        }
    );
    assert_eq!(pending_texts(log.as_ref()).await.len(), 2);
    assert!(manager.history().await.is_empty());
    assert!(manager.last_error().is_some());
}

#[tokio::test]
async fn new_chat_restores_system_prompt() {
    let mut cfg = config(20, 4, true);
    cfg.system_prompt = Some("You are terse.".into());
    let manager = ContextManager::new(
        cfg,
        Arc::new(FlakyMemoryStore::default()),
        Arc::new(InMemoryPendingTurnLog::new()),
        Arc::new(RecordingSummarizer::default()),
    );
    common::converse(&manager, 1, "n").await;
    let _ = manager.clear_session(false).await;

    let history = manager.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_system());
    assert_eq!(history[0].text(), "You are terse.");
}

#[tokio::test]
async fn journal_failure_rejects_turn() {
    let log = Arc::new(FailingPendingLog::default());
    let manager = ContextManager::new(
        config(20, 4, true),
        Arc::new(FlakyMemoryStore::default()),
        log.clone(),
        Arc::new(RecordingSummarizer::default()),
    );
    manager.append_user_turn("accepted").await.unwrap();
    log.set_fail_appends(true);

    let err = manager.append_user_turn("rejected").await.unwrap_err();
    assert_matches!(err, ContextError::StorageFailed(_));
    assert_eq!(manager.history().await.len(), 1);
    assert_eq!(manager.snapshot().turns_since_compaction, 1);
    assert!(manager.last_error().unwrap().contains("could not be saved"));
}

#[tokio::test]
async fn memory_context_tracks_store() {
    let memory = Arc::new(FlakyMemoryStore::default());
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let manager = manager_with(
        memory.clone(),
        log,
        Arc::new(RecordingSummarizer::default()),
    );
    assert_eq!(manager.get_memory_context_for_next_request().await, "");

    common::converse(&manager, 2, "m").await;
    let _ = manager.clear_session(true).await;
    let context = manager.get_memory_context_for_next_request().await;
    assert!(context.starts_with("[Memory from previous conversations]\n"));
    assert!(context.contains("m question 1"));
    assert!(manager.snapshot().has_memory);

    manager.clear_memory().await.unwrap();
    assert_eq!(manager.get_memory_context_for_next_request().await, "");
    assert!(memory.get().await.unwrap().is_none());
}

#[tokio::test]
async fn store_changes_are_observable() {
    use tokio_stream::StreamExt;

    let memory = Arc::new(FlakyMemoryStore::default());
    let manager = manager_with(
        memory.clone(),
        Arc::new(InMemoryPendingTurnLog::new()),
        Arc::new(RecordingSummarizer::default()),
    );
    let mut stream = memory.observe();
    assert!(stream.next().await.unwrap().is_none());

    common::converse(&manager, 1, "w").await;
    let _ = manager.clear_session(true).await;
    let slot = stream.next().await.unwrap().unwrap();
    assert!(slot.text.contains("w question 0"));
}
