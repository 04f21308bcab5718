//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If `~/.parley/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ParleySettings;

/// Resolve the Parley home directory (`~/.parley`).
pub fn parley_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley")
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    parley_home().join("settings.json")
}

/// Resolve the database path, falling back to `~/.parley/parley.db`.
pub fn resolve_database_path(settings: &ParleySettings) -> PathBuf {
    if settings.storage.database_path.is_empty() {
        parley_home().join("parley.db")
    } else {
        PathBuf::from(&settings.storage.database_path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning so a typo in the environment
/// never prevents startup.
pub fn apply_overrides_with(
    settings: &mut ParleySettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Compaction ──────────────────────────────────────────────────
    if let Some(v) = read("PARLEY_COMPACTION_ENABLED") {
        if let Some(b) = checked(parse_bool(&v), "PARLEY_COMPACTION_ENABLED", &v) {
            settings.compaction.enabled = b;
        }
    }
    if let Some(v) = read("PARLEY_TRIGGER_THRESHOLD") {
        if let Some(n) = checked(
            parse_usize_range(&v, 1, 10_000),
            "PARLEY_TRIGGER_THRESHOLD",
            &v,
        ) {
            settings.compaction.trigger_threshold = n;
        }
    }
    if let Some(v) = read("PARLEY_KEEP_RECENT") {
        if let Some(n) = checked(parse_usize_range(&v, 0, 10_000), "PARLEY_KEEP_RECENT", &v) {
            settings.compaction.keep_recent_count = n;
        }
    }

    // ── Memory ──────────────────────────────────────────────────────
    if let Some(v) = read("PARLEY_MEMORY_ENABLED") {
        if let Some(b) = checked(parse_bool(&v), "PARLEY_MEMORY_ENABLED", &v) {
            settings.memory.enabled = b;
        }
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read("PARLEY_DB") {
        settings.storage.database_path = v;
    }
    if let Some(v) = read("PARLEY_POOL_SIZE") {
        if let Some(n) = checked(parse_u64_range(&v, 1, 64), "PARLEY_POOL_SIZE", &v) {
            #[allow(clippy::cast_possible_truncation)]
            {
                settings.storage.pool_size = n as u32;
            }
        }
    }

    // ── Summarizer ──────────────────────────────────────────────────
    if let Some(v) = read("PARLEY_SUMMARIZER_TIMEOUT_MS") {
        if let Some(n) = checked(
            parse_u64_range(&v, 100, 600_000),
            "PARLEY_SUMMARIZER_TIMEOUT_MS",
            &v,
        ) {
            settings.summarizer.timeout_ms = n;
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn checked<T>(parsed: Option<T>, key: &str, value: &str) -> Option<T> {
    if parsed.is_none() {
        warn!(key, value, "invalid env var, ignoring");
    }
    parsed
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
