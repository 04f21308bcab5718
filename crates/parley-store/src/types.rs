//! Persisted record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed key of the single memory slot.
pub const MEMORY_SLOT_KEY: &str = "previous_dialog_summary";

/// What produced the summary currently held in the memory slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Automatic or manual compaction of the live history.
    Compaction,
    /// Final summary written when a session is cleared or backgrounded.
    SessionEnd,
    /// Summary rebuilt from the pending-turn log after a crash.
    Recovery,
}

impl MemorySource {
    /// Stable string stored in the `source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compaction => "compaction",
            Self::SessionEnd => "session_end",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compaction" => Ok(Self::Compaction),
            "session_end" => Ok(Self::SessionEnd),
            "recovery" => Ok(Self::Recovery),
            other => Err(format!("unknown memory source: {other}")),
        }
    }
}

/// The persisted cross-session summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySlot {
    /// Summary text.
    pub text: String,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// What produced the summary.
    pub source: MemorySource,
}

/// One journaled user turn awaiting summarization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTurn {
    /// Monotonic sequence number (append order).
    pub seq: i64,
    /// User-authored text.
    pub text: String,
    /// When the turn was journaled.
    pub created_at: DateTime<Utc>,
}
