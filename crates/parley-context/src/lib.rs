//! # parley-context
//!
//! Bounded conversation context with durable cross-session memory.
//!
//! - **History**: [`ConversationHistory`], per-provider ordered turns with cached estimates
//! - **Trigger**: [`CompactionTrigger`], turns-since-compaction counter and threshold decision
//! - **Summarizers**: the [`Summarizer`] seam, an offline [`KeywordSummarizer`], and
//!   [`LlmSummarizer`] over an injected [`CompletionClient`]
//! - **Compaction engine**: [`CompactionEngine`] splits history, summarizes the old part,
//!   and rebuilds it in the provider's [`SummaryEncoding`]
//! - **Context manager**: [`ContextManager`], the public surface that serializes every
//!   mutation, journals user turns for crash recovery, and persists summaries
//! - **Lifecycle**: [`SessionLifecycleHooks`] maps app signals onto the manager

#![deny(unsafe_code)]

pub mod compaction_engine;
pub mod constants;
pub mod context_manager;
pub mod errors;
pub mod history;
pub mod lifecycle;
pub mod llm_summarizer;
pub mod summarizer;
pub mod trigger;
pub mod types;

pub use compaction_engine::{CompactionEngine, CompactionPlan, EngineOutcome};
pub use context_manager::{ContextManager, ContextManagerConfig};
pub use errors::{ContextError, Result, SummarizerError};
pub use history::ConversationHistory;
pub use lifecycle::{LifecycleSignal, SessionLifecycleHooks};
pub use llm_summarizer::{
    CompletionClient, CompletionRequest, CompletionResponse, LlmSummarizer, LlmSummarizerConfig,
};
pub use summarizer::{KeywordSummarizer, Summarizer, serialize_turns};
pub use trigger::{CompactionTrigger, TriggerDecision};
pub use types::{
    CompactionOutcome, CompactionPolicy, CompactionResult, CompactionStats, ContextSnapshot,
    ProviderProfile, RecoveryOutcome, SessionEndOutcome, SessionPhase, SummaryEncoding,
    SummaryOutput, TokenStats,
};
