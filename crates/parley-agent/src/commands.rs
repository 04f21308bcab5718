//! Subcommand implementations.
//!
//! Every command writes its report to the supplied writer so the binary and
//! the tests share one code path.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parley_context::{
    CompactionOutcome, ContextManager, ContextManagerConfig, KeywordSummarizer, LifecycleSignal,
    RecoveryOutcome, SessionEndOutcome, SessionLifecycleHooks,
};
use parley_core::token_estimator::estimate;
use parley_settings::{ParleySettings, load_settings_from_path, resolve_database_path};
use parley_store::{
    ConnectionConfig, MemoryStore, PendingTurnLog, SqliteMemoryStore, SqlitePendingTurnLog,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::cli::{Cli, Command, MemoryAction, PendingAction};

/// Characters of a user line echoed back by the offline assistant.
const ECHO_CHARS: usize = 60;

/// Load settings from `--settings` (or the default path) and apply `--db`.
pub fn load_settings(cli: &Cli) -> Result<ParleySettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(parley_settings::settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(db) = &cli.db {
        settings.storage.database_path = db.to_string_lossy().into_owned();
    }
    Ok(settings)
}

/// The durable stores behind one database file.
pub struct Stores {
    /// Memory slot.
    pub memory: Arc<SqliteMemoryStore>,
    /// Pending turn log.
    pub pending: Arc<SqlitePendingTurnLog>,
}

/// Open (and migrate) the database named by `settings`.
pub fn open_stores(settings: &ParleySettings) -> Result<Stores> {
    let path = resolve_database_path(settings);
    open_stores_at(&path, &ConnectionConfig::from(&settings.storage))
}

fn open_stores_at(path: &Path, config: &ConnectionConfig) -> Result<Stores> {
    debug!(path = %path.display(), "opening database");
    let pool = parley_store::sqlite::open_file(path, config)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    let memory = SqliteMemoryStore::new(pool.clone()).context("Failed to load memory slot")?;
    Ok(Stores {
        memory: Arc::new(memory),
        pending: Arc::new(SqlitePendingTurnLog::new(pool)),
    })
}

/// Build a manager over `stores` that summarizes offline.
pub fn offline_manager(settings: &ParleySettings, stores: &Stores) -> ContextManager {
    ContextManager::new(
        ContextManagerConfig::from(settings),
        stores.memory.clone(),
        stores.pending.clone(),
        Arc::new(KeywordSummarizer),
    )
}

/// Run one subcommand.
pub async fn run<R, W>(
    command: Command,
    settings: &ParleySettings,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if command == Command::Settings {
        let json = serde_json::to_string_pretty(settings)?;
        writeln!(out, "{json}")?;
        return Ok(());
    }

    let stores = open_stores(settings)?;
    match command {
        Command::Memory { action } => memory(action, &stores, out).await,
        Command::Pending { action } => pending(action, &stores, out).await,
        Command::Recover => recover(settings, &stores, out).await,
        Command::Chat => chat(settings, &stores, input, out).await,
        Command::Settings => Ok(()),
    }
}

async fn memory<W: Write>(action: MemoryAction, stores: &Stores, out: &mut W) -> Result<()> {
    match action {
        MemoryAction::Show => match stores.memory.get().await? {
            Some(slot) => {
                writeln!(
                    out,
                    "source: {}\nupdated: {}\n\n{}",
                    slot.source,
                    slot.updated_at.to_rfc3339(),
                    slot.text
                )?;
            }
            None => writeln!(out, "No memory stored.")?,
        },
        MemoryAction::Clear => {
            stores.memory.clear().await?;
            stores.pending.clear().await?;
            info!("memory cleared from the command line");
            writeln!(out, "Memory cleared.")?;
        }
    }
    Ok(())
}

async fn pending<W: Write>(action: PendingAction, stores: &Stores, out: &mut W) -> Result<()> {
    match action {
        PendingAction::List => {
            let entries = stores.pending.read_all().await?;
            if entries.is_empty() {
                writeln!(out, "Pending log is empty.")?;
            }
            for entry in entries {
                writeln!(
                    out,
                    "{:>4}  {}  {}",
                    entry.seq,
                    entry.created_at.to_rfc3339(),
                    entry.text
                )?;
            }
        }
        PendingAction::Clear => {
            let dropped = stores.pending.read_all().await?.len();
            stores.pending.clear().await?;
            writeln!(out, "Dropped {dropped} pending turn(s).")?;
        }
    }
    Ok(())
}

async fn recover<W: Write>(settings: &ParleySettings, stores: &Stores, out: &mut W) -> Result<()> {
    let manager = offline_manager(settings, stores);
    match manager.recover().await {
        RecoveryOutcome::Clean => writeln!(out, "Nothing to recover.")?,
        RecoveryOutcome::Recovered { entries } => {
            writeln!(out, "Recovered {entries} pending turn(s) into memory.")?;
        }
        RecoveryOutcome::Discarded { entries } => {
            writeln!(out, "Memory is disabled; discarded {entries} pending turn(s).")?;
        }
        RecoveryOutcome::Failed { entries, reason } => {
            anyhow::bail!("Recovery failed with {entries} pending turn(s) kept: {reason}");
        }
    }
    Ok(())
}

// ─── Offline chat ────────────────────────────────────────────────────────────

async fn chat<R, W>(settings: &ParleySettings, stores: &Stores, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let manager = Arc::new(offline_manager(settings, stores));
    let hooks = SessionLifecycleHooks::from_settings(manager.clone(), &settings.memory);
    let preview_chars = settings.memory.preview_chars;

    hooks.handle(LifecycleSignal::Started).await;
    let memory = manager.get_memory_context_for_next_request().await;
    if !memory.is_empty() {
        writeln!(out, "{memory}\n")?;
    }

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/compact" => {
                let outcome = manager.manual_compact().await?;
                report_compaction(&outcome, out)?;
            }
            "/new" => {
                let outcome = manager.clear_session(true).await;
                report_session_end(&outcome, out)?;
            }
            "/memory" => match manager.memory_preview(preview_chars).await {
                Some(preview) => writeln!(out, "{preview}")?,
                None => writeln!(out, "(no memory)")?,
            },
            "/stats" => {
                let json = serde_json::to_string_pretty(&manager.snapshot())?;
                writeln!(out, "{json}")?;
            }
            text => {
                manager.append_user_turn(text).await?;
                let reply = offline_reply(text);
                let tokens_in = manager.snapshot().estimated_tokens;
                let tokens_out = u64::from(estimate(&reply));
                manager.append_assistant_turn(&reply, tokens_in, tokens_out).await;
                writeln!(out, "{reply}")?;

                let outcome = manager.maybe_auto_compact().await?;
                if outcome.is_compacted() {
                    report_compaction(&outcome, out)?;
                }
            }
        }
    }

    hooks.handle(LifecycleSignal::Stopping).await;
    Ok(())
}

fn offline_reply(text: &str) -> String {
    let clipped: String = text.chars().take(ECHO_CHARS).collect();
    if clipped.len() < text.len() {
        format!("(offline) noted: {clipped}...")
    } else {
        format!("(offline) noted: {clipped}")
    }
}

fn report_compaction<W: Write>(outcome: &CompactionOutcome, out: &mut W) -> Result<()> {
    match outcome {
        CompactionOutcome::Compacted {
            result,
            persist_error,
        } => {
            writeln!(
                out,
                "[compacted {} turns, saved {} tokens]",
                result.original_turn_count,
                result.saved_tokens()
            )?;
            if let Some(error) = persist_error {
                writeln!(out, "[warning: {error}]")?;
            }
        }
        CompactionOutcome::InsufficientHistory {
            non_system_turns,
            required,
        } => writeln!(
            out,
            "[not enough history: {non_system_turns} of {required} turns]"
        )?,
        CompactionOutcome::AlreadyRunning => writeln!(out, "[compaction already running]")?,
        CompactionOutcome::NotDue | CompactionOutcome::Disabled => {}
    }
    Ok(())
}

fn report_session_end<W: Write>(outcome: &SessionEndOutcome, out: &mut W) -> Result<()> {
    match outcome {
        SessionEndOutcome::Saved { user_turns } => {
            writeln!(out, "[new chat; summarized {user_turns} request(s) into memory]")?;
        }
        SessionEndOutcome::NothingToSave | SessionEndOutcome::NotRequested => {
            writeln!(out, "[new chat]")?;
        }
        SessionEndOutcome::MemoryDisabled => writeln!(out, "[new chat; memory deleted]")?,
        SessionEndOutcome::Failed { error } => {
            writeln!(out, "[new chat; summary not saved: {error}]")?;
        }
    }
    Ok(())
}
