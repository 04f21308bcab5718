//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley context engine maintenance tool.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Parley context engine maintenance tool")]
pub struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// `SQLite` database path (overrides settings).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` wins over both).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Inspect or clear the cross-session memory slot.
    Memory {
        /// Memory action.
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Inspect or clear the pending turn log.
    Pending {
        /// Pending log action.
        #[command(subcommand)]
        action: PendingAction,
    },
    /// Fold leftover pending turns into memory with the offline summarizer.
    Recover,
    /// Print the effective settings as JSON.
    Settings,
    /// Offline chat on stdin. Lines are user turns; `/compact`, `/new`,
    /// `/memory` and `/stats` are commands.
    Chat,
}

/// `parley memory ...`
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAction {
    /// Print the stored summary.
    Show,
    /// Delete the stored summary and the pending log.
    Clear,
}

/// `parley pending ...`
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// List journaled user turns.
    List,
    /// Drop journaled user turns without summarizing them.
    Clear,
}
