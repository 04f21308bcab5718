//! Compaction through the public manager surface.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use parley_context::{
    CompactionOutcome, ContextError, ContextManager, SessionPhase, SummarizerError,
};
use parley_store::{InMemoryPendingTurnLog, MemorySource, MemoryStore};
use tracing::Level;

use common::{FlakyMemoryStore, RecordingSummarizer, config, converse, pending_texts};

struct Fixture {
    manager: ContextManager,
    memory: Arc<FlakyMemoryStore>,
    log: Arc<InMemoryPendingTurnLog>,
    summarizer: Arc<RecordingSummarizer>,
}

fn fixture(threshold: usize, keep: usize, memory: FlakyMemoryStore) -> Fixture {
    let memory = Arc::new(memory);
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let summarizer = Arc::new(RecordingSummarizer::default());
    let manager = ContextManager::new(
        config(threshold, keep, true),
        memory.clone(),
        log.clone(),
        summarizer.clone(),
    );
    Fixture {
        manager,
        memory,
        log,
        summarizer,
    }
}

#[tokio::test]
async fn fires_once_at_sixth_turn_and_keeps_recent_tail() {
    let f = fixture(6, 2, FlakyMemoryStore::default());
    let mut fired_at = Vec::new();

    for i in 1..=6 {
        if i % 2 == 1 {
            f.manager.append_user_turn(&format!("request {i}")).await.unwrap();
        } else {
            f.manager.append_assistant_turn(&format!("reply {i}"), 30, 10).await;
        }
        if f.manager.maybe_auto_compact().await.unwrap().is_compacted() {
            fired_at.push(i);
        }
    }

    assert_eq!(fired_at, vec![6]);
    let history = f.manager.history().await;
    assert_eq!(history.len(), 2 + 2);
    assert_eq!(history[2].text(), "request 5");
    assert_eq!(history[3].text(), "reply 6");
    assert_eq!(f.summarizer.call_count(), 1);
}

#[tokio::test]
async fn threshold_boundary() {
    let f = fixture(5, 1, FlakyMemoryStore::default());
    converse(&f.manager, 2, "t").await;
    assert_matches!(f.manager.maybe_auto_compact().await.unwrap(), CompactionOutcome::NotDue);

    f.manager.append_user_turn("fifth").await.unwrap();
    assert!(f.manager.maybe_auto_compact().await.unwrap().is_compacted());
}

#[tokio::test]
async fn recent_turns_survive_in_order() {
    let f = fixture(8, 3, FlakyMemoryStore::default());
    converse(&f.manager, 4, "o").await;
    let before = f.manager.history().await;

    let _ = f.manager.manual_compact().await.unwrap();
    let after = f.manager.history().await;
    let tail = &after[after.len() - 3..];
    let expected = &before[before.len() - 3..];
    assert_eq!(
        tail.iter().map(|t| t.text()).collect::<Vec<_>>(),
        expected.iter().map(|t| t.text()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn saved_tokens_accumulate_across_compactions() {
    let f = fixture(4, 0, FlakyMemoryStore::default());
    let mut saved = Vec::new();

    for round in 0..3 {
        converse(&f.manager, 2, &format!("round {round} with a fairly long question text")).await;
        match f.manager.maybe_auto_compact().await.unwrap() {
            CompactionOutcome::Compacted { result, .. } => {
                assert_eq!(
                    result.saved_tokens(),
                    i64::try_from(result.original_tokens).unwrap()
                        - i64::try_from(result.compressed_tokens).unwrap()
                );
                saved.push(result.saved_tokens());
            }
            other => panic!("expected compaction, got {other:?}"),
        }
    }

    let stats = f.manager.stats();
    assert_eq!(stats.compaction_count, 3);
    assert_eq!(stats.total_saved_tokens, saved.iter().sum::<i64>());
    assert_eq!(f.manager.token_stats().summarizer_tokens_in, 150);
}

#[tokio::test]
async fn later_summaries_carry_earlier_ones() {
    let f = fixture(4, 0, FlakyMemoryStore::default());
    converse(&f.manager, 2, "first").await;
    let _ = f.manager.manual_compact().await.unwrap();
    converse(&f.manager, 1, "second").await;
    let _ = f.manager.manual_compact().await.unwrap();

    let second_input = &f.summarizer.calls()[1];
    assert!(second_input[0].text().starts_with("prior context: "));
    let slot = f.memory.get().await.unwrap().unwrap();
    assert!(slot.text.contains("first question 0"));
    assert!(slot.text.contains("second question 0"));
}

#[tokio::test]
async fn pending_log_keeps_only_unsummarized_user_turns() {
    let f = fixture(6, 3, FlakyMemoryStore::default());
    converse(&f.manager, 3, "p").await;
    assert_eq!(pending_texts(f.log.as_ref()).await.len(), 3);

    let _ = f.manager.maybe_auto_compact().await.unwrap();
    // Kept verbatim: "p answer 1", "p question 2", "p answer 2".
    assert_eq!(pending_texts(f.log.as_ref()).await, vec!["p question 2"]);
    assert_eq!(
        f.memory.get().await.unwrap().unwrap().source,
        MemorySource::Compaction
    );
}

#[tokio::test]
async fn summarizer_failure_leaves_history_untouched() {
    let f = fixture(4, 1, FlakyMemoryStore::default());
    f.summarizer.set_failing(true);
    converse(&f.manager, 2, "f").await;
    let before = f.manager.history().await;

    let err = f.manager.maybe_auto_compact().await.unwrap_err();
    assert_matches!(
        err,
        ContextError::SummarizationFailed(SummarizerError::CallFailed { .. })
    );
    assert_eq!(f.manager.history().await, before);
    assert_eq!(f.manager.snapshot().turns_since_compaction, 4);
    assert!(f.manager.last_error().is_some());
    assert_eq!(f.manager.phase(), SessionPhase::Accumulating);
    assert!(f.memory.get().await.unwrap().is_none());

    // Still due, so the next check retries.
    f.summarizer.set_failing(false);
    assert!(f.manager.maybe_auto_compact().await.unwrap().is_compacted());
    assert!(f.manager.last_error().is_none());
}

#[tokio::test]
async fn memory_save_is_retried() {
    let f = fixture(4, 0, FlakyMemoryStore::failing_saves(2));
    converse(&f.manager, 2, "r").await;

    let outcome = f.manager.maybe_auto_compact().await.unwrap();
    assert_matches!(outcome, CompactionOutcome::Compacted { persist_error: None, .. });
    assert_eq!(f.memory.save_attempts(), 3);
    assert!(pending_texts(f.log.as_ref()).await.is_empty());
}

#[tokio::test]
async fn exhausted_save_keeps_compaction_and_log() {
    let f = fixture(4, 0, FlakyMemoryStore::failing_saves(10));
    converse(&f.manager, 2, "x").await;

    let outcome = f.manager.maybe_auto_compact().await.unwrap();
    assert_matches!(
        outcome,
        CompactionOutcome::Compacted {
            persist_error: Some(ContextError::StorageFailed(_)),
            ..
        }
    );
    assert_eq!(f.memory.save_attempts(), 3);
    assert_eq!(f.manager.history().await.len(), 2);
    assert_eq!(pending_texts(f.log.as_ref()).await.len(), 2);
    assert!(f.manager.last_error().unwrap().contains("Memory could not be saved"));
}

#[tokio::test]
async fn unsaved_compaction_entries_are_trimmed_by_the_next_save() {
    // Three attempts per save: the first compaction's save fails outright.
    let f = fixture(4, 0, FlakyMemoryStore::failing_saves(3));
    converse(&f.manager, 2, "u").await;
    let outcome = f.manager.maybe_auto_compact().await.unwrap();
    assert_matches!(outcome, CompactionOutcome::Compacted { persist_error: Some(_), .. });
    assert_eq!(pending_texts(f.log.as_ref()).await.len(), 2);

    converse(&f.manager, 2, "v").await;
    let outcome = f.manager.maybe_auto_compact().await.unwrap();
    assert_matches!(outcome, CompactionOutcome::Compacted { persist_error: None, .. });
    let slot = f.memory.get().await.unwrap().unwrap();
    assert!(slot.text.contains("u question 0"));
    assert!(slot.text.contains("v question 1"));
    assert!(pending_texts(f.log.as_ref()).await.is_empty());
}

#[tokio::test]
async fn preview_spends_summarizer_tokens() {
    let f = fixture(20, 1, FlakyMemoryStore::default());
    converse(&f.manager, 2, "w").await;
    let preview = f.manager.preview_compaction().await.unwrap().unwrap();
    assert_eq!(preview.original_turn_count, 3);
    assert_eq!(f.summarizer.call_count(), 1);

    let tokens = f.manager.token_stats();
    assert_eq!(tokens.summarizer_tokens_in, 50);
    assert_eq!(tokens.summarizer_tokens_out, 8);
    assert_eq!(f.manager.stats().compaction_count, 0);
    assert_eq!(pending_texts(f.log.as_ref()).await.len(), 2);
}

#[tokio::test]
async fn concurrent_checks_compact_once() {
    let f = fixture(4, 0, FlakyMemoryStore::default());
    converse(&f.manager, 2, "c").await;

    let (a, b) = tokio::join!(f.manager.maybe_auto_compact(), f.manager.maybe_auto_compact());
    let compacted = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| o.is_compacted())
        .count();
    assert_eq!(compacted, 1);
    assert_eq!(f.summarizer.call_count(), 1);
    assert_eq!(f.manager.stats().compaction_count, 1);
}

#[tokio::test]
async fn memory_disabled_compaction_does_not_persist() {
    let memory = Arc::new(FlakyMemoryStore::default());
    let log = Arc::new(InMemoryPendingTurnLog::new());
    let manager = ContextManager::new(
        config(4, 0, false),
        memory.clone(),
        log.clone(),
        Arc::new(RecordingSummarizer::default()),
    );
    converse(&manager, 2, "d").await;

    assert!(manager.maybe_auto_compact().await.unwrap().is_compacted());
    assert_eq!(memory.save_attempts(), 0);
    assert!(pending_texts(log.as_ref()).await.is_empty());
}

#[tokio::test]
async fn compaction_is_logged() {
    let (logs, _guard) = parley_logging::capture_logs();
    let f = fixture(4, 0, FlakyMemoryStore::default());
    converse(&f.manager, 2, "l").await;
    let _ = f.manager.maybe_auto_compact().await.unwrap();

    assert!(logs.has_event(Level::INFO, "automatic compaction triggered"));
    assert_eq!(
        logs.field_value("compaction planned", "summarized").as_deref(),
        Some("4")
    );
}
