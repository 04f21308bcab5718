//! Value types exchanged with the context engine.
//!
//! Everything the presentation layer reads is serializable with `camelCase`
//! keys.

use parley_core::ProviderId;
use parley_settings::CompactionSettings;
use serde::{Deserialize, Serialize};

use crate::errors::ContextError;

// ─────────────────────────────────────────────────────────────────────────────
// Policy and providers
// ─────────────────────────────────────────────────────────────────────────────

/// When and how much to compact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionPolicy {
    /// Whether automatic compaction runs.
    pub enabled: bool,
    /// Non-system turns since the last compaction that make one due.
    pub trigger_threshold: usize,
    /// Most recent non-system turns kept verbatim.
    pub keep_recent_count: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::from(&CompactionSettings::default())
    }
}

impl From<&CompactionSettings> for CompactionPolicy {
    fn from(settings: &CompactionSettings) -> Self {
        Self {
            enabled: settings.enabled,
            trigger_threshold: settings.trigger_threshold,
            keep_recent_count: settings.keep_recent_count,
        }
    }
}

impl CompactionPolicy {
    /// Non-system turns needed before compaction can replace anything.
    #[must_use]
    pub fn required_turns(&self) -> usize {
        self.keep_recent_count.saturating_add(2)
    }
}

/// How a provider wants a summary placed in the rebuilt history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SummaryEncoding {
    /// Append the summary to the SYSTEM turn's instructions.
    SystemInstruction,
    /// Insert a synthetic USER/ASSISTANT exchange carrying the summary.
    #[default]
    ConversationalExchange,
}

/// A provider as seen by the context engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    /// History scope.
    pub id: ProviderId,
    /// Where compaction puts summaries.
    pub summary_encoding: SummaryEncoding,
}

impl ProviderProfile {
    /// Create a profile.
    pub fn new(id: impl Into<ProviderId>, summary_encoding: SummaryEncoding) -> Self {
        Self {
            id: id.into(),
            summary_encoding,
        }
    }
}

impl Default for ProviderProfile {
    fn default() -> Self {
        Self::new("default", SummaryEncoding::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Summaries and compaction results
// ─────────────────────────────────────────────────────────────────────────────

/// What a [`Summarizer`](crate::Summarizer) returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutput {
    /// The summary.
    pub summary_text: String,
    /// Tokens consumed by the summarization request.
    pub input_tokens_used: u64,
    /// Tokens produced by the summarization request.
    pub output_tokens_used: u64,
}

impl SummaryOutput {
    /// Output with no usage accounting (offline summarizers).
    pub fn offline(summary_text: impl Into<String>) -> Self {
        Self {
            summary_text: summary_text.into(),
            input_tokens_used: 0,
            output_tokens_used: 0,
        }
    }
}

/// Accounting for one compaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    /// The summary that replaced the older turns.
    pub summary_text: String,
    /// How many turns were summarized.
    pub original_turn_count: usize,
    /// Sum of the estimates of the summarized turns.
    pub original_tokens: u64,
    /// Estimate of `summary_text` alone.
    pub compressed_tokens: u64,
}

impl CompactionResult {
    /// `original_tokens - compressed_tokens`. Negative when the summary grew.
    #[must_use]
    pub fn saved_tokens(&self) -> i64 {
        let original = i64::try_from(self.original_tokens).unwrap_or(i64::MAX);
        let compressed = i64::try_from(self.compressed_tokens).unwrap_or(i64::MAX);
        original.saturating_sub(compressed)
    }
}

/// Cumulative compaction accounting for the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionStats {
    /// Successful compactions.
    pub compaction_count: u32,
    /// `original_tokens` of the latest compaction.
    pub last_original_tokens: u64,
    /// `compressed_tokens` of the latest compaction.
    pub last_compressed_tokens: u64,
    /// Sum of every compaction's `saved_tokens()`.
    pub total_saved_tokens: i64,
    /// What the requests so far would have cost with nothing compacted away.
    pub total_virtual_tokens: u64,
}

impl CompactionStats {
    /// Fold one compaction into the totals.
    pub fn record(&mut self, result: &CompactionResult) {
        self.compaction_count = self.compaction_count.saturating_add(1);
        self.last_original_tokens = result.original_tokens;
        self.last_compressed_tokens = result.compressed_tokens;
        self.total_saved_tokens = self.total_saved_tokens.saturating_add(result.saved_tokens());
    }

    /// Account for one request that sent `tokens_in` tokens.
    pub fn record_request(&mut self, tokens_in: u64) {
        let virtual_in = i64::try_from(tokens_in)
            .unwrap_or(i64::MAX)
            .saturating_add(self.total_saved_tokens);
        self.total_virtual_tokens = self.total_virtual_tokens.saturating_add_signed(virtual_in);
    }
}

/// Cumulative token usage for the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    /// Prompt tokens reported by the provider.
    pub tokens_in: u64,
    /// Completion tokens reported by the provider.
    pub tokens_out: u64,
    /// Assistant turns recorded.
    pub requests: u64,
    /// Prompt tokens spent on summarization.
    pub summarizer_tokens_in: u64,
    /// Completion tokens spent on summarization.
    pub summarizer_tokens_out: u64,
}

impl TokenStats {
    /// Account for one summarization call.
    pub fn record_summary(&mut self, output: &SummaryOutput) {
        self.summarizer_tokens_in = self
            .summarizer_tokens_in
            .saturating_add(output.input_tokens_used);
        self.summarizer_tokens_out = self
            .summarizer_tokens_out
            .saturating_add(output.output_tokens_used);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// What a compaction request did.
#[derive(Debug)]
pub enum CompactionOutcome {
    /// History was rebuilt around a summary.
    Compacted {
        /// Accounting for this compaction.
        result: CompactionResult,
        /// Set when saving the summary or trimming the pending log failed.
        /// The compacted history is kept regardless.
        persist_error: Option<ContextError>,
    },
    /// Too few non-system turns to replace anything.
    InsufficientHistory {
        /// Non-system turns present.
        non_system_turns: usize,
        /// Non-system turns needed.
        required: usize,
    },
    /// Another compaction was in flight.
    AlreadyRunning,
    /// The trigger threshold has not been reached.
    NotDue,
    /// Automatic compaction is switched off.
    Disabled,
}

impl CompactionOutcome {
    /// Whether history was rewritten.
    #[must_use]
    pub fn is_compacted(&self) -> bool {
        matches!(self, Self::Compacted { .. })
    }
}

/// What crash recovery did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The pending log was empty.
    Clean,
    /// Logged turns were summarized into the memory slot and the log cleared.
    Recovered {
        /// Entries folded into the summary.
        entries: usize,
    },
    /// Memory is disabled; the log was cleared without saving.
    Discarded {
        /// Entries dropped.
        entries: usize,
    },
    /// Recovery failed and the log was left intact for the next attempt.
    Failed {
        /// Entries still pending.
        entries: usize,
        /// Why it failed.
        reason: String,
    },
}

/// What ending a session did with its turns.
#[derive(Debug)]
pub enum SessionEndOutcome {
    /// A summary of the session's user turns was saved.
    Saved {
        /// User turns summarized.
        user_turns: usize,
    },
    /// Summary requested but the session had no user turns.
    NothingToSave,
    /// No summary requested.
    NotRequested,
    /// Memory is disabled; the memory slot and pending log were deleted.
    MemoryDisabled,
    /// Summarizing or saving failed. The pending log is kept for recovery.
    Failed {
        /// The failure.
        error: ContextError,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Observable state
// ─────────────────────────────────────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Created; crash recovery has not run yet.
    AwaitingRecovery,
    /// No conversation turns.
    Empty,
    /// Conversation in progress.
    Accumulating,
    /// A compaction is in flight.
    Compacting,
    /// The app is in the background or stopping.
    Paused,
}

/// Point-in-time view of the manager, published on every change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Active provider.
    pub provider: ProviderId,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Turns in the active history, system turn included.
    pub turn_count: usize,
    /// Sum of cached estimates over the active history.
    pub estimated_tokens: u64,
    /// Non-system turns since the last successful compaction.
    pub turns_since_compaction: usize,
    /// Token usage.
    pub token_stats: TokenStats,
    /// Compaction accounting.
    pub compaction_stats: CompactionStats,
    /// Whether summaries persist across sessions.
    pub memory_enabled: bool,
    /// Whether a cached memory summary exists.
    pub has_memory: bool,
    /// Most recent user-visible error.
    pub last_error: Option<String>,
}
