//! Settings types.
//!
//! Every section uses `camelCase` on the wire and `#[serde(default)]` so a
//! partial settings file only needs the keys it overrides.

use parley_core::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// History compaction policy.
    pub compaction: CompactionSettings,
    /// Long-term memory slot behaviour.
    pub memory: MemorySettings,
    /// Durable store location and pool tuning.
    pub storage: StorageSettings,
    /// Retry policy for memory slot writes.
    pub retry: RetryConfig,
    /// Summarizer limits.
    pub summarizer: SummarizerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.compaction.trigger_threshold == 0 {
            return Err(SettingsError::InvalidValue(
                "compaction.triggerThreshold must be >= 1".into(),
            ));
        }
        if self.storage.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "storage.poolSize must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::InvalidValue(
                "retry.jitterFactor must be within 0.0..=1.0".into(),
            ));
        }
        if self.compaction.keep_recent_count >= self.compaction.trigger_threshold {
            tracing::warn!(
                keep_recent_count = self.compaction.keep_recent_count,
                trigger_threshold = self.compaction.trigger_threshold,
                "keepRecentCount >= triggerThreshold; automatic compaction will rarely shrink history"
            );
        }
        Ok(())
    }
}

/// History compaction policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Whether automatic compaction runs at all.
    pub enabled: bool,
    /// Non-system turns since the last compaction that trigger another one.
    pub trigger_threshold: usize,
    /// Most recent non-system turns preserved verbatim.
    pub keep_recent_count: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_threshold: 20,
            keep_recent_count: 4,
        }
    }
}

/// Long-term memory settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Whether summaries are persisted across sessions.
    pub enabled: bool,
    /// User turns required before backgrounding persists a session summary.
    pub min_user_turns_for_summary: usize,
    /// Maximum characters shown in a memory preview.
    pub preview_chars: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_user_turns_for_summary: 2,
            preview_chars: 160,
        }
    }
}

/// Durable store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Database file path. Empty means `~/.parley/parley.db`.
    pub database_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Summarizer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizerSettings {
    /// Upper bound on a single summarization call.
    pub timeout_ms: u64,
    /// Output token budget requested from the model.
    pub max_output_tokens: u32,
    /// Fall back to the keyword summarizer when the model call fails.
    pub fallback_to_keywords: bool,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_output_tokens: 512,
            fallback_to_keywords: false,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}
