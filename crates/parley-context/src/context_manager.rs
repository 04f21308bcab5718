//! Context manager.
//!
//! [`ContextManager`] is the public surface of the engine. It owns the live
//! history of every provider, the token and compaction statistics, the
//! compaction trigger, and a read-through cache of the memory slot. Every
//! mutation runs under one async lock held across its awaits, so operations
//! never interleave.
//!
//! ## Durability
//!
//! User turns are journaled to the [`PendingTurnLog`] before they enter
//! history, and each turn remembers its entry's sequence number. Once a
//! summary is saved, exactly the entries it covers are removed; entries of
//! parked providers or of sessions cleared without a summary stay put. A
//! crash at any point leaves every unsummarized turn on disk for
//! [`ContextManager::recover`].
//!
//! ## Cancellation
//!
//! Operations are not cancel-safe. A future dropped mid-flight may leave a
//! summary saved while the log still holds its turns. Drive every call to
//! completion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_core::retry::jittered_backoff_delay;
use parley_core::{ProviderId, RetryConfig, Role, Turn};
use parley_settings::ParleySettings;
use parley_store::{MemorySlot, MemorySource, MemoryStore, PendingTurnLog, StoreError};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, trace, warn};

use crate::compaction_engine::{
    CompactionEngine, EngineOutcome, prior_context_turn, split_summary_block, with_summary_block,
};
use crate::constants::MEMORY_CONTEXT_HEADER;
use crate::errors::{ContextError, Result, SummarizerError};
use crate::history::ConversationHistory;
use crate::summarizer::{Summarizer, truncate};
use crate::trigger::CompactionTrigger;
use crate::types::{
    CompactionOutcome, CompactionPolicy, CompactionResult, CompactionStats, ContextSnapshot,
    ProviderProfile, RecoveryOutcome, SessionEndOutcome, SessionPhase, SummaryOutput, TokenStats,
};

// =============================================================================
// Configuration
// =============================================================================

/// Construction-time settings for [`ContextManager`].
#[derive(Clone, Debug, Default)]
pub struct ContextManagerConfig {
    /// Compaction policy.
    pub policy: CompactionPolicy,
    /// Whether summaries persist across sessions.
    pub memory_enabled: bool,
    /// Retry policy for memory slot writes.
    pub retry: RetryConfig,
    /// Initially active provider.
    pub provider: ProviderProfile,
    /// System prompt seeded into every new history.
    pub system_prompt: Option<String>,
}

impl From<&ParleySettings> for ContextManagerConfig {
    fn from(settings: &ParleySettings) -> Self {
        Self {
            policy: CompactionPolicy::from(&settings.compaction),
            memory_enabled: settings.memory.enabled,
            retry: settings.retry.clone(),
            provider: ProviderProfile::default(),
            system_prompt: None,
        }
    }
}

fn warn_if_policy_inverted(policy: &CompactionPolicy) {
    if policy.keep_recent_count >= policy.trigger_threshold {
        warn!(
            keep_recent_count = policy.keep_recent_count,
            trigger_threshold = policy.trigger_threshold,
            "keep_recent_count should be below trigger_threshold"
        );
    }
}

fn fresh_history(system_prompt: Option<&str>) -> ConversationHistory {
    system_prompt.map_or_else(ConversationHistory::new, ConversationHistory::with_system_prompt)
}

// =============================================================================
// Session state
// =============================================================================

struct SessionState {
    provider: ProviderProfile,
    active: ConversationHistory,
    parked: HashMap<ProviderId, ConversationHistory>,
    system_prompt: Option<String>,
    policy: CompactionPolicy,
    trigger: CompactionTrigger,
    token_stats: TokenStats,
    compaction_stats: CompactionStats,
    memory_enabled: bool,
    memory_cache: Option<MemorySlot>,
    cache_primed: bool,
    awaiting_recovery: bool,
    paused: bool,
    last_error: Option<String>,
}

impl SessionState {
    fn new(config: ContextManagerConfig) -> Self {
        Self {
            active: fresh_history(config.system_prompt.as_deref()),
            parked: HashMap::new(),
            trigger: CompactionTrigger::new(&config.policy),
            provider: config.provider,
            system_prompt: config.system_prompt,
            policy: config.policy,
            token_stats: TokenStats::default(),
            compaction_stats: CompactionStats::default(),
            memory_enabled: config.memory_enabled,
            memory_cache: None,
            cache_primed: false,
            awaiting_recovery: true,
            paused: false,
            last_error: None,
        }
    }

    fn phase(&self, compacting: bool) -> SessionPhase {
        if self.awaiting_recovery {
            SessionPhase::AwaitingRecovery
        } else if compacting {
            SessionPhase::Compacting
        } else if self.paused {
            SessionPhase::Paused
        } else if self.active.non_system_count() == 0 {
            SessionPhase::Empty
        } else {
            SessionPhase::Accumulating
        }
    }

    fn snapshot(&self, compacting: bool) -> ContextSnapshot {
        ContextSnapshot {
            provider: self.provider.id.clone(),
            phase: self.phase(compacting),
            turn_count: self.active.len(),
            estimated_tokens: self.active.total_tokens(),
            turns_since_compaction: self.trigger.turns_since_compaction(),
            token_stats: self.token_stats.clone(),
            compaction_stats: self.compaction_stats.clone(),
            memory_enabled: self.memory_enabled,
            has_memory: self.memory_cache.is_some(),
            last_error: self.last_error.clone(),
        }
    }

    fn set_memory_cache(&mut self, slot: Option<MemorySlot>) {
        self.memory_cache = slot;
        self.cache_primed = true;
    }

    /// Journal entries still owned by a live history, parked ones included.
    fn live_journal(&self) -> HashSet<i64> {
        self.parked
            .values()
            .chain(std::iter::once(&self.active))
            .flat_map(ConversationHistory::journal_seqs)
            .collect()
    }
}

/// Clears the in-flight flag on every exit path.
struct CompactingGuard<'a>(&'a AtomicBool);

impl<'a> CompactingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CompactingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// ContextManager
// =============================================================================

/// Owns the conversation and coordinates compaction, memory, and recovery.
///
/// Read-only accessors ([`snapshot`](Self::snapshot), [`phase`](Self::phase),
/// [`stats`](Self::stats), ...) read the latest published snapshot and never
/// wait for an in-flight operation.
pub struct ContextManager {
    state: Mutex<SessionState>,
    compacting: AtomicBool,
    memory_store: Arc<dyn MemoryStore>,
    pending_log: Arc<dyn PendingTurnLog>,
    summarizer: Arc<dyn Summarizer>,
    retry: RetryConfig,
    snapshot_tx: watch::Sender<ContextSnapshot>,
}

impl ContextManager {
    /// Create a manager. Call [`recover`](Self::recover) before accepting turns;
    /// the first append runs it automatically if not.
    pub fn new(
        config: ContextManagerConfig,
        memory_store: Arc<dyn MemoryStore>,
        pending_log: Arc<dyn PendingTurnLog>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        warn_if_policy_inverted(&config.policy);
        let retry = config.retry.clone();
        let state = SessionState::new(config);
        let (snapshot_tx, _rx) = watch::channel(state.snapshot(false));
        Self {
            state: Mutex::new(state),
            compacting: AtomicBool::new(false),
            memory_store,
            pending_log,
            summarizer,
            retry,
            snapshot_tx,
        }
    }

    // ─── Turns ───────────────────────────────────────────────────────────

    /// Append a user turn, journaling it first when memory is enabled.
    ///
    /// Blank text is ignored. If journaling fails the turn is not appended
    /// and [`ContextError::StorageFailed`] is returned.
    pub async fn append_user_turn(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            trace!("ignoring blank user turn");
            return Ok(());
        }
        let mut state = self.lock_ready().await;

        let mut turn = Turn::user(text);
        if state.memory_enabled {
            match self.pending_log.append(text).await {
                Ok(seq) => turn = turn.with_journal_seq(seq),
                Err(error) => {
                    warn!(error = %error, "failed to journal user turn");
                    state.last_error = Some(format!("Your message could not be saved: {error}"));
                    self.publish(&state);
                    return Err(error.into());
                }
            }
        }

        state.active.push(turn);
        state.trigger.record_turn();
        state.paused = false;
        self.publish(&state);
        Ok(())
    }

    /// Append an assistant turn and account for the request that produced it.
    pub async fn append_assistant_turn(&self, text: &str, tokens_in: u64, tokens_out: u64) {
        let mut state = self.lock_ready().await;

        state.active.push(Turn::assistant(text));
        state.trigger.record_turn();
        state.token_stats.tokens_in = state.token_stats.tokens_in.saturating_add(tokens_in);
        state.token_stats.tokens_out = state.token_stats.tokens_out.saturating_add(tokens_out);
        state.token_stats.requests = state.token_stats.requests.saturating_add(1);
        state.compaction_stats.record_request(tokens_in);
        state.paused = false;
        trace!(tokens_in, tokens_out, "assistant turn recorded");
        self.publish(&state);
    }

    // ─── Compaction ──────────────────────────────────────────────────────

    /// Compact if the trigger threshold has been reached.
    pub async fn maybe_auto_compact(&self) -> Result<CompactionOutcome> {
        if self.compacting.load(Ordering::Acquire) {
            return Ok(CompactionOutcome::AlreadyRunning);
        }
        let mut state = self.lock_ready().await;
        if !state.policy.enabled {
            return Ok(CompactionOutcome::Disabled);
        }
        let decision = state.trigger.evaluate();
        if !decision.compact {
            trace!(reason = %decision.reason, "compaction not due");
            return Ok(CompactionOutcome::NotDue);
        }
        info!(reason = %decision.reason, "automatic compaction triggered");
        self.compact_locked(&mut state).await
    }

    /// Compact now, ignoring the threshold.
    pub async fn manual_compact(&self) -> Result<CompactionOutcome> {
        if self.compacting.load(Ordering::Acquire) {
            return Ok(CompactionOutcome::AlreadyRunning);
        }
        let mut state = self.lock_ready().await;
        info!("manual compaction requested");
        self.compact_locked(&mut state).await
    }

    /// What compaction would produce now, without changing history or memory.
    ///
    /// This calls the summarizer, so it costs a model request; its usage is
    /// added to the summarizer token counters. `None` when there is not
    /// enough history.
    pub async fn preview_compaction(&self) -> Result<Option<CompactionResult>> {
        let mut state = self.lock_ready().await;
        let engine = CompactionEngine::new(state.policy.clone());
        let preview = engine
            .preview(
                state.active.as_slice(),
                state.provider.summary_encoding,
                self.summarizer.as_ref(),
            )
            .await?;
        let Some(plan) = preview else {
            return Ok(None);
        };
        state.token_stats.record_summary(&plan.summary);
        self.publish(&state);
        Ok(Some(plan.result))
    }

    /// Replace the compaction policy. The turn counter is kept.
    pub async fn set_policy(&self, policy: CompactionPolicy) {
        warn_if_policy_inverted(&policy);
        let mut state = self.state.lock().await;
        state.trigger.set_policy(&policy);
        state.policy = policy;
        self.publish(&state);
    }

    async fn compact_locked(&self, state: &mut SessionState) -> Result<CompactionOutcome> {
        let Some(guard) = CompactingGuard::acquire(&self.compacting) else {
            return Ok(CompactionOutcome::AlreadyRunning);
        };
        self.publish(state);
        let outcome = self.run_compaction(state).await;
        drop(guard);
        self.publish(state);
        outcome
    }

    async fn run_compaction(&self, state: &mut SessionState) -> Result<CompactionOutcome> {
        let engine = CompactionEngine::new(state.policy.clone());
        let history = state.active.as_slice().to_vec();

        let planned = engine
            .compact(&history, state.provider.summary_encoding, self.summarizer.as_ref())
            .await;
        let plan = match planned {
            Ok(EngineOutcome::Compacted(plan)) => plan,
            Ok(EngineOutcome::InsufficientHistory {
                non_system_turns,
                required,
            }) => {
                return Ok(CompactionOutcome::InsufficientHistory {
                    non_system_turns,
                    required,
                });
            }
            Err(error) => {
                warn!(error = %error, "compaction failed, history unchanged");
                state.last_error = Some(format!("Compaction failed: {error}"));
                return Err(error.into());
            }
        };

        // The summary covers the turns that roll out plus any earlier
        // summary's unsaved entries, which it folds in.
        let summarized = &history[..history.len() - plan.recent.len()];
        let mut covered = state.active.folded_journal().to_vec();
        covered.extend(summarized.iter().filter_map(Turn::journal_seq));

        state.active.replace(plan.turns);
        state.trigger.reset();
        state.compaction_stats.record(&plan.result);
        state.token_stats.record_summary(&plan.summary);
        state.last_error = None;

        let persisted = state.memory_enabled;
        let persist_error = if persisted {
            self.persist_compaction(state, &plan.result.summary_text, &covered)
                .await
                .err()
        } else {
            None
        };
        if persisted && persist_error.is_none() {
            state.active.set_folded_journal(Vec::new());
        } else {
            state.active.set_folded_journal(covered);
        }
        if let Some(error) = &persist_error {
            warn!(error = %error, "compacted history kept but memory was not updated");
            state.last_error = Some(format!("Memory could not be saved: {error}"));
        }

        Ok(CompactionOutcome::Compacted {
            result: plan.result,
            persist_error,
        })
    }

    /// Save the summary, then drop the journal entries it covers.
    async fn persist_compaction(
        &self,
        state: &mut SessionState,
        summary: &str,
        covered: &[i64],
    ) -> Result<()> {
        let slot = self.save_with_retry(summary, MemorySource::Compaction).await?;
        state.set_memory_cache(Some(slot));
        self.pending_log.remove(covered).await?;
        debug!(removed = covered.len(), "pending log trimmed after compaction");
        Ok(())
    }

    // ─── Session end and recovery ────────────────────────────────────────

    /// End the session.
    ///
    /// With memory enabled and `persist_summary_first`, the session's user
    /// turns are summarized and saved before anything is wiped. With memory
    /// disabled, the memory slot and pending log are deleted. The active
    /// history and all statistics are reset in every case.
    pub async fn clear_session(&self, persist_summary_first: bool) -> SessionEndOutcome {
        let mut state = self.lock_ready().await;

        let outcome = if !state.memory_enabled {
            self.forget_memory(&mut state).await
        } else if persist_summary_first {
            self.summarize_session(&mut state).await
        } else {
            SessionEndOutcome::NotRequested
        };

        state.active = fresh_history(state.system_prompt.as_deref());
        state.trigger.reset();
        state.token_stats = TokenStats::default();
        state.compaction_stats = CompactionStats::default();
        state.paused = false;
        if let SessionEndOutcome::Failed { error } = &outcome {
            state.last_error = Some(format!("Session summary was not saved: {error}"));
        }
        info!(outcome = ?outcome, "session cleared");
        self.publish(&state);
        outcome
    }

    async fn summarize_session(&self, state: &mut SessionState) -> SessionEndOutcome {
        let user_turns = state.active.user_turns();
        if user_turns.is_empty() {
            return SessionEndOutcome::NothingToSave;
        }

        // A summary folded into the system prompt is session context too.
        let mut input = Vec::with_capacity(user_turns.len() + 1);
        let prior = state
            .active
            .system_turn()
            .and_then(|t| split_summary_block(t.text()).1);
        if let Some(prior) = prior {
            input.push(prior_context_turn(&prior));
        }
        input.extend_from_slice(&user_turns);

        let summary = match self.summarize_checked(&input).await {
            Ok(output) => {
                state.token_stats.record_summary(&output);
                output.summary_text
            }
            Err(error) => {
                warn!(error = %error, "session summary failed, pending log kept");
                return SessionEndOutcome::Failed {
                    error: error.into(),
                };
            }
        };

        match self.save_with_retry(&summary, MemorySource::SessionEnd).await {
            Ok(slot) => state.set_memory_cache(Some(slot)),
            Err(error) => {
                warn!(error = %error, "session summary could not be saved, pending log kept");
                return SessionEndOutcome::Failed {
                    error: error.into(),
                };
            }
        }
        if let Err(error) = self.pending_log.remove(&state.active.journal_seqs()).await {
            warn!(error = %error, "session summary saved but pending log not trimmed");
        }
        SessionEndOutcome::Saved {
            user_turns: user_turns.len(),
        }
    }

    async fn forget_memory(&self, state: &mut SessionState) -> SessionEndOutcome {
        let cleared = match self.memory_store.clear().await {
            Ok(()) => self.pending_log.clear().await,
            Err(error) => Err(error),
        };
        state.set_memory_cache(None);
        match cleared {
            Ok(()) => SessionEndOutcome::MemoryDisabled,
            Err(error) => {
                warn!(error = %error, "failed to delete memory on new chat");
                SessionEndOutcome::Failed {
                    error: error.into(),
                }
            }
        }
    }

    /// Fold orphaned pending-log entries into memory.
    ///
    /// An entry is orphaned when no live history holds its turn: it was left
    /// by a previous process or by a session cleared without a summary.
    /// Never fails: problems are logged and the log is left intact for the
    /// next attempt. Primes the memory cache afterwards.
    pub async fn recover(&self) -> RecoveryOutcome {
        let mut state = self.state.lock().await;
        let outcome = self.recover_locked(&mut state).await;
        state.paused = false;
        self.publish(&state);
        outcome
    }

    /// Return from the background.
    ///
    /// Runs [`recover`](Self::recover) only if it has not run in this
    /// process; a live session is left as it is.
    pub async fn resume(&self) -> RecoveryOutcome {
        let mut state = self.state.lock().await;
        let outcome = if state.awaiting_recovery {
            self.recover_locked(&mut state).await
        } else {
            RecoveryOutcome::Clean
        };
        state.paused = false;
        self.publish(&state);
        outcome
    }

    async fn recover_locked(&self, state: &mut SessionState) -> RecoveryOutcome {
        state.awaiting_recovery = false;
        let outcome = self.replay_pending_log(state).await;
        match &outcome {
            RecoveryOutcome::Clean => debug!("pending log empty, nothing to recover"),
            RecoveryOutcome::Recovered { entries } => {
                info!(entries, "recovered pending turns into memory");
            }
            RecoveryOutcome::Discarded { entries } => {
                info!(entries, "memory disabled, pending turns discarded");
            }
            RecoveryOutcome::Failed { entries, reason } => {
                warn!(entries, reason = %reason, "recovery failed, pending log kept");
            }
        }
        if !matches!(outcome, RecoveryOutcome::Recovered { .. }) {
            self.prime_cache(state).await;
        }
        outcome
    }

    async fn replay_pending_log(&self, state: &mut SessionState) -> RecoveryOutcome {
        let entries = match self.pending_log.read_all().await {
            Ok(entries) => entries,
            Err(error) => {
                return RecoveryOutcome::Failed {
                    entries: 0,
                    reason: error.to_string(),
                };
            }
        };
        // Entries still backing a live history are not orphans.
        let live = state.live_journal();
        let orphans: Vec<_> = entries
            .into_iter()
            .filter(|entry| !live.contains(&entry.seq))
            .collect();
        if orphans.is_empty() {
            return RecoveryOutcome::Clean;
        }
        let count = orphans.len();
        let seqs: Vec<i64> = orphans.iter().map(|entry| entry.seq).collect();
        let failed = |reason: String| RecoveryOutcome::Failed {
            entries: count,
            reason,
        };

        if !state.memory_enabled {
            return match self.pending_log.remove(&seqs).await {
                Ok(()) => RecoveryOutcome::Discarded { entries: count },
                Err(error) => failed(error.to_string()),
            };
        }

        // Keep whatever the slot already holds; the journal only has the tail.
        let mut input = Vec::with_capacity(count + 1);
        match self.memory_store.get().await {
            Ok(Some(slot)) => input.push(prior_context_turn(&slot.text)),
            Ok(None) => {}
            Err(error) => return failed(error.to_string()),
        }
        input.extend(
            orphans
                .into_iter()
                .map(|entry| Turn::at(Role::User, entry.text, entry.created_at)),
        );

        let summary = match self.summarize_checked(&input).await {
            Ok(output) => output.summary_text,
            Err(error) => return failed(error.to_string()),
        };
        match self.save_with_retry(&summary, MemorySource::Recovery).await {
            Ok(slot) => state.set_memory_cache(Some(slot)),
            Err(error) => return failed(error.to_string()),
        }
        match self.pending_log.remove(&seqs).await {
            Ok(()) => RecoveryOutcome::Recovered { entries: count },
            Err(error) => failed(error.to_string()),
        }
    }

    // ─── Memory ──────────────────────────────────────────────────────────

    /// The memory block to prepend to the next request, or `""`.
    pub async fn get_memory_context_for_next_request(&self) -> String {
        let mut state = self.state.lock().await;
        if !state.memory_enabled {
            return String::new();
        }
        if !state.cache_primed {
            self.prime_cache(&mut state).await;
        }
        state
            .memory_cache
            .as_ref()
            .map(|slot| slot.text.trim())
            .filter(|text| !text.is_empty())
            .map(|text| format!("{MEMORY_CONTEXT_HEADER}\n{text}"))
            .unwrap_or_default()
    }

    /// Turn cross-session memory on or off.
    pub async fn set_memory_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.memory_enabled != enabled {
            info!(enabled, "memory toggled");
        }
        state.memory_enabled = enabled;
        self.publish(&state);
    }

    /// Delete the memory slot and the pending log.
    pub async fn clear_memory(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let cleared = match self.memory_store.clear().await {
            Ok(()) => self.pending_log.clear().await,
            Err(error) => Err(error),
        };
        match cleared {
            Ok(()) => {
                state.set_memory_cache(None);
                info!("memory cleared");
                self.publish(&state);
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "failed to clear memory");
                state.last_error = Some(format!("Memory could not be cleared: {error}"));
                self.publish(&state);
                Err(error.into())
            }
        }
    }

    /// The cached summary clipped to `max_chars`, if any.
    pub async fn memory_preview(&self, max_chars: usize) -> Option<String> {
        let mut state = self.state.lock().await;
        if !state.cache_primed {
            self.prime_cache(&mut state).await;
        }
        state
            .memory_cache
            .as_ref()
            .map(|slot| truncate(&slot.text, max_chars))
    }

    async fn prime_cache(&self, state: &mut SessionState) {
        match self.memory_store.get().await {
            Ok(slot) => state.set_memory_cache(slot),
            Err(error) => warn!(error = %error, "failed to load memory slot"),
        }
    }

    // ─── Providers and prompts ───────────────────────────────────────────

    /// Activate `profile`. Each provider id has its own history.
    pub async fn switch_provider(&self, profile: ProviderProfile) {
        let mut state = self.state.lock().await;
        if state.provider.id != profile.id {
            let next = state
                .parked
                .remove(&profile.id)
                .unwrap_or_else(|| fresh_history(state.system_prompt.as_deref()));
            let previous = std::mem::replace(&mut state.active, next);
            let previous_id = state.provider.id.clone();
            let _ = state.parked.insert(previous_id, previous);
            info!(
                from = %state.provider.id,
                to = %profile.id,
                turns = state.active.len(),
                "switched provider"
            );
        }
        state.provider = profile;
        self.publish(&state);
    }

    /// Set the system prompt of the active history. Blank text removes it.
    ///
    /// A summary already folded into the system turn is preserved.
    pub async fn set_system_prompt(&self, text: &str) {
        let mut state = self.state.lock().await;
        let base = (!text.trim().is_empty()).then(|| text.to_owned());
        let summary = state
            .active
            .system_turn()
            .and_then(|turn| split_summary_block(turn.text()).1);

        match (&base, &summary) {
            (Some(base), Some(summary)) => state.active.set_system_text(&with_summary_block(base, summary)),
            (Some(base), None) => state.active.set_system_text(base),
            (None, Some(summary)) => state.active.set_system_text(&with_summary_block("", summary)),
            (None, None) => state.active.clear_system(),
        }
        state.system_prompt = base;
        self.publish(&state);
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Mark the session paused (app backgrounded or stopping).
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        state.paused = true;
        self.publish(&state);
    }

    /// USER turns in the active history.
    pub async fn user_turn_count(&self) -> usize {
        self.state.lock().await.active.user_turn_count()
    }

    // ─── Read access ─────────────────────────────────────────────────────

    /// A copy of the active history.
    pub async fn history(&self) -> Vec<Turn> {
        self.state.lock().await.active.as_slice().to_vec()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ContextSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ContextSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.snapshot_tx.borrow().phase
    }

    /// Compaction accounting.
    pub fn stats(&self) -> CompactionStats {
        self.snapshot_tx.borrow().compaction_stats.clone()
    }

    /// Token usage.
    pub fn token_stats(&self) -> TokenStats {
        self.snapshot_tx.borrow().token_stats.clone()
    }

    /// Most recent user-visible error.
    pub fn last_error(&self) -> Option<String> {
        self.snapshot_tx.borrow().last_error.clone()
    }

    /// Whether cross-session memory is on.
    pub fn is_memory_enabled(&self) -> bool {
        self.snapshot_tx.borrow().memory_enabled
    }

    // ─── Internals ───────────────────────────────────────────────────────

    /// Lock the session, running crash recovery first if it has not run.
    async fn lock_ready(&self) -> MutexGuard<'_, SessionState> {
        let mut state = self.state.lock().await;
        if state.awaiting_recovery {
            let _ = self.recover_locked(&mut state).await;
        }
        state
    }

    async fn summarize_checked(
        &self,
        turns: &[Turn],
    ) -> std::result::Result<SummaryOutput, SummarizerError> {
        let mut output = self.summarizer.summarize(turns).await?;
        let trimmed = output.summary_text.trim();
        if trimmed.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }
        output.summary_text = trimmed.to_owned();
        Ok(output)
    }

    async fn save_with_retry(
        &self,
        text: &str,
        source: MemorySource,
    ) -> std::result::Result<MemorySlot, StoreError> {
        let mut attempt = 0;
        loop {
            match self.memory_store.save(text, source).await {
                Ok(slot) => return Ok(slot),
                Err(error) if attempt < self.retry.max_retries => {
                    let delay_ms = jittered_backoff_delay(&self.retry, attempt);
                    warn!(
                        attempt,
                        delay_ms,
                        source = %source,
                        error = %error,
                        "memory save failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn publish(&self, state: &SessionState) {
        let next = state.snapshot(self.compacting.load(Ordering::Acquire));
        let _ = self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
