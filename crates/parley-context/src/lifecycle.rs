//! Application lifecycle adapter.
//!
//! The engine does not watch the host app. Whoever does forwards the
//! signals here, and these hooks turn them into manager calls in the
//! required order: recover on start, summarize then pause on the way out.
//! Resuming leaves a live session alone. Failures are logged and swallowed.

use std::sync::Arc;

use parley_settings::MemorySettings;
use tracing::{debug, info, warn};

use crate::context_manager::ContextManager;
use crate::types::{RecoveryOutcome, SessionEndOutcome};

/// A host application state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Process started.
    Started,
    /// App returned to the foreground.
    Resumed,
    /// App is moving to the background.
    EnteringBackground,
    /// Process is shutting down.
    Stopping,
}

/// Maps [`LifecycleSignal`]s onto a [`ContextManager`].
#[derive(Clone)]
pub struct SessionLifecycleHooks {
    manager: Arc<ContextManager>,
    min_user_turns_for_summary: usize,
}

impl SessionLifecycleHooks {
    /// Summarize on exit only when at least `min_user_turns_for_summary`
    /// user turns exist.
    pub fn new(manager: Arc<ContextManager>, min_user_turns_for_summary: usize) -> Self {
        Self {
            manager,
            min_user_turns_for_summary,
        }
    }

    /// Hooks configured from memory settings.
    pub fn from_settings(manager: Arc<ContextManager>, settings: &MemorySettings) -> Self {
        Self::new(manager, settings.min_user_turns_for_summary)
    }

    /// The managed context.
    pub fn manager(&self) -> &Arc<ContextManager> {
        &self.manager
    }

    /// Dispatch a signal.
    pub async fn handle(&self, signal: LifecycleSignal) {
        debug!(signal = ?signal, "lifecycle signal");
        match signal {
            LifecycleSignal::Started => {
                let _ = self.on_start().await;
            }
            LifecycleSignal::Resumed => {
                let _ = self.on_resume().await;
            }
            LifecycleSignal::EnteringBackground => {
                let _ = self.on_enter_background().await;
            }
            LifecycleSignal::Stopping => {
                let _ = self.on_stop().await;
            }
        }
    }

    /// Run crash recovery.
    pub async fn on_start(&self) -> RecoveryOutcome {
        self.manager.recover().await
    }

    /// Unpause. Recovery runs only if start never ran it.
    pub async fn on_resume(&self) -> RecoveryOutcome {
        self.manager.resume().await
    }

    /// Persist a session summary if there is enough to say, then pause.
    ///
    /// Returns `None` when the session was too short to summarize.
    pub async fn on_enter_background(&self) -> Option<SessionEndOutcome> {
        self.end_session().await
    }

    /// Same as [`on_enter_background`](Self::on_enter_background).
    pub async fn on_stop(&self) -> Option<SessionEndOutcome> {
        self.end_session().await
    }

    async fn end_session(&self) -> Option<SessionEndOutcome> {
        let user_turns = self.manager.user_turn_count().await;
        let outcome = if user_turns >= self.min_user_turns_for_summary {
            let outcome = self.manager.clear_session(true).await;
            match &outcome {
                SessionEndOutcome::Failed { error } => {
                    warn!(error = %error, "session summary on exit failed");
                }
                other => info!(outcome = ?other, user_turns, "session ended"),
            }
            Some(outcome)
        } else {
            debug!(
                user_turns,
                min = self.min_user_turns_for_summary,
                "too few user turns to summarize on exit"
            );
            None
        };
        self.manager.pause().await;
        outcome
    }
}
