//! Compaction engine.
//!
//! [`CompactionEngine`] rewrites a history around a summary. It never touches
//! storage or shared state: it takes a snapshot of the turns, calls the
//! summarizer, and returns the rebuilt turns plus accounting. Applying the
//! plan and persisting the summary belong to the caller.
//!
//! ## Algorithm
//!
//! 1. Split non-system turns into "to summarize" (older) and "recent" (the
//!    last `keep_recent_count`).
//! 2. Summarize the older part.
//! 3. Rebuild in the provider's [`SummaryEncoding`], then append `recent`
//!    unchanged.
//!
//! ## Encodings
//!
//! ```text
//! ConversationalExchange           SystemInstruction
//! [system]   (kept as-is, if any)  [system] "<base>\n\n[Summary ...]\n<summary>"
//! [user]     "prior context: <s>"  ...recent...
//! [assistant] "acknowledged"
//! ...recent...
//! ```
//!
//! With `SystemInstruction`, a summary block left by an earlier compaction is
//! stripped and fed back to the summarizer as a leading `prior context:` turn,
//! so each summary covers everything compacted so far.

use parley_core::token_estimator::{estimate, estimate_turns};
use parley_core::Turn;
use tracing::{debug, info};

use crate::constants::{COMPACTION_ACK_TEXT, PRIOR_CONTEXT_PREFIX, SUMMARY_BLOCK_HEADER};
use crate::errors::SummarizerError;
use crate::summarizer::Summarizer;
use crate::types::{CompactionPolicy, CompactionResult, SummaryEncoding, SummaryOutput};

// =============================================================================
// Outcomes
// =============================================================================

/// A compaction ready to apply.
#[derive(Clone, Debug)]
pub struct CompactionPlan {
    /// The rebuilt history.
    pub turns: Vec<Turn>,
    /// Accounting.
    pub result: CompactionResult,
    /// Recent turns carried over verbatim.
    pub recent: Vec<Turn>,
    /// Summarizer output, including its usage.
    pub summary: SummaryOutput,
}

/// What [`CompactionEngine::compact`] produced.
#[derive(Clone, Debug)]
pub enum EngineOutcome {
    /// History can be replaced with the plan.
    Compacted(CompactionPlan),
    /// Fewer than `keep_recent_count + 2` non-system turns.
    InsufficientHistory {
        /// Non-system turns present.
        non_system_turns: usize,
        /// Non-system turns needed.
        required: usize,
    },
}

// =============================================================================
// CompactionEngine
// =============================================================================

/// Splits, summarizes, and rebuilds histories.
#[derive(Clone, Debug)]
pub struct CompactionEngine {
    policy: CompactionPolicy,
}

impl CompactionEngine {
    /// Create an engine for `policy`.
    #[must_use]
    pub fn new(policy: CompactionPolicy) -> Self {
        Self { policy }
    }

    /// Compact `history`, which must keep any SYSTEM turn at index 0.
    ///
    /// The threshold is not consulted; callers decide when to compact.
    pub async fn compact(
        &self,
        history: &[Turn],
        encoding: SummaryEncoding,
        summarizer: &dyn Summarizer,
    ) -> Result<EngineOutcome, SummarizerError> {
        let (system, conversation) = match history.split_first() {
            Some((first, rest)) if first.is_system() => (Some(first), rest),
            _ => (None, history),
        };

        let required = self.policy.required_turns();
        if conversation.len() < required {
            debug!(
                non_system_turns = conversation.len(),
                required, "compaction skipped: insufficient history"
            );
            return Ok(EngineOutcome::InsufficientHistory {
                non_system_turns: conversation.len(),
                required,
            });
        }

        let split_at = conversation.len() - self.policy.keep_recent_count;
        let (to_summarize, recent) = conversation.split_at(split_at);

        let (base_instructions, prior_summary) = match (encoding, system) {
            (SummaryEncoding::SystemInstruction, Some(turn)) => split_summary_block(turn.text()),
            _ => (String::new(), None),
        };

        let mut input = Vec::with_capacity(to_summarize.len() + 1);
        if let Some(prior) = &prior_summary {
            input.push(prior_context_turn(prior));
        }
        input.extend_from_slice(to_summarize);

        debug!(
            to_summarize = to_summarize.len(),
            recent = recent.len(),
            carries_prior = prior_summary.is_some(),
            "compaction: calling summarizer"
        );
        let summary = summarizer.summarize(&input).await?;
        let summary_text = summary.summary_text.trim().to_owned();
        if summary_text.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }

        let mut turns = Vec::with_capacity(recent.len() + 3);
        match encoding {
            SummaryEncoding::SystemInstruction => {
                turns.push(Turn::system(with_summary_block(&base_instructions, &summary_text)));
            }
            SummaryEncoding::ConversationalExchange => {
                if let Some(system) = system {
                    turns.push(system.clone());
                }
                turns.push(prior_context_turn(&summary_text));
                turns.push(Turn::assistant(COMPACTION_ACK_TEXT));
            }
        }
        turns.extend_from_slice(recent);

        let result = CompactionResult {
            compressed_tokens: u64::from(estimate(&summary_text)),
            original_tokens: estimate_turns(to_summarize),
            original_turn_count: to_summarize.len(),
            summary_text,
        };
        info!(
            summarized = result.original_turn_count,
            original_tokens = result.original_tokens,
            compressed_tokens = result.compressed_tokens,
            saved = result.saved_tokens(),
            "compaction planned"
        );

        Ok(EngineOutcome::Compacted(CompactionPlan {
            turns,
            result,
            recent: recent.to_vec(),
            summary,
        }))
    }

    /// Dry run: the plan compaction would produce right now, left unapplied.
    ///
    /// The summarizer is still called, so the plan's usage is real spend.
    /// Returns `None` when there is not enough history.
    pub async fn preview(
        &self,
        history: &[Turn],
        encoding: SummaryEncoding,
        summarizer: &dyn Summarizer,
    ) -> Result<Option<CompactionPlan>, SummarizerError> {
        Ok(match self.compact(history, encoding, summarizer).await? {
            EngineOutcome::Compacted(plan) => Some(plan),
            EngineOutcome::InsufficientHistory { .. } => None,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Synthetic USER turn carrying an earlier summary.
#[must_use]
pub fn prior_context_turn(summary: &str) -> Turn {
    Turn::user(format!("{PRIOR_CONTEXT_PREFIX}{summary}"))
}

/// Split SYSTEM text into base instructions and an appended summary, if any.
#[must_use]
pub fn split_summary_block(text: &str) -> (String, Option<String>) {
    match text.find(SUMMARY_BLOCK_HEADER) {
        Some(idx) => {
            let base = text[..idx].trim_end().to_owned();
            let summary = text[idx + SUMMARY_BLOCK_HEADER.len()..].trim();
            let summary = (!summary.is_empty()).then(|| summary.to_owned());
            (base, summary)
        }
        None => (text.to_owned(), None),
    }
}

/// Append a summary block to base instructions.
#[must_use]
pub fn with_summary_block(base: &str, summary: &str) -> String {
    if base.trim().is_empty() {
        format!("{SUMMARY_BLOCK_HEADER}\n{summary}")
    } else {
        format!("{base}\n\n{SUMMARY_BLOCK_HEADER}\n{summary}")
    }
}

// =============================================================================
// Tests
// =============================================================================
