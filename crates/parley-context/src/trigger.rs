//! Compaction trigger.
//!
//! Counts non-system turns observed since the last successful compaction and
//! decides whether an automatic compaction is due. The counter only resets on
//! success, so a failed compaction is retried at the next evaluation.

use tracing::debug;

use crate::types::CompactionPolicy;

/// Result of a trigger evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerDecision {
    /// Whether compaction should run.
    pub compact: bool,
    /// Reason for the decision.
    pub reason: String,
}

/// Turn-count compaction trigger.
#[derive(Clone, Debug)]
pub struct CompactionTrigger {
    enabled: bool,
    threshold: usize,
    turns_since_compaction: usize,
}

impl CompactionTrigger {
    /// Create a trigger for the given policy.
    #[must_use]
    pub fn new(policy: &CompactionPolicy) -> Self {
        Self {
            enabled: policy.enabled,
            threshold: policy.trigger_threshold,
            turns_since_compaction: 0,
        }
    }

    /// Count one non-system turn.
    pub fn record_turn(&mut self) {
        self.turns_since_compaction = self.turns_since_compaction.saturating_add(1);
    }

    /// Whether automatic compaction is due. Does not change the counter.
    #[must_use]
    pub fn evaluate(&self) -> TriggerDecision {
        if !self.enabled {
            return TriggerDecision {
                compact: false,
                reason: "compaction disabled".to_string(),
            };
        }
        if self.turns_since_compaction >= self.threshold {
            return TriggerDecision {
                compact: true,
                reason: format!(
                    "{} turns since last compaction >= threshold {}",
                    self.turns_since_compaction, self.threshold
                ),
            };
        }
        TriggerDecision {
            compact: false,
            reason: "below threshold".to_string(),
        }
    }

    /// Reset the counter after a successful compaction.
    pub fn reset(&mut self) {
        debug!(turns = self.turns_since_compaction, "resetting compaction trigger");
        self.turns_since_compaction = 0;
    }

    /// Apply a new policy without touching the counter.
    pub fn set_policy(&mut self, policy: &CompactionPolicy) {
        self.enabled = policy.enabled;
        self.threshold = policy.trigger_threshold;
    }

    /// Non-system turns since the last successful compaction.
    #[must_use]
    pub fn turns_since_compaction(&self) -> usize {
        self.turns_since_compaction
    }
}
