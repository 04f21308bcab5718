//! LLM-backed summarizer.
//!
//! [`LlmSummarizer`] serializes the turns, sends them with a fixed compression
//! instruction through an injected [`CompletionClient`], and enforces a
//! deadline. Optionally falls back to [`KeywordSummarizer`] on any failure.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::Turn;
use parley_settings::SummarizerSettings;
use tracing::{debug, warn};

use crate::constants::COMPRESSION_INSTRUCTION;
use crate::errors::SummarizerError;
use crate::summarizer::{KeywordSummarizer, Summarizer, serialize_turns};
use crate::types::SummaryOutput;

// =============================================================================
// Transport seam
// =============================================================================

/// One completion request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    /// What the model should do with the transcript.
    pub instruction: String,
    /// Serialized turns.
    pub transcript: String,
    /// Output budget.
    pub max_output_tokens: u32,
}

/// One completion response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Model output.
    pub text: String,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
}

/// The HTTP transport to an LLM endpoint, provided by the embedding app.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, SummarizerError>;
}

// =============================================================================
// LlmSummarizer
// =============================================================================

/// Tuning for [`LlmSummarizer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmSummarizerConfig {
    /// Deadline for one call.
    pub timeout: Duration,
    /// Output budget per call.
    pub max_output_tokens: u32,
    /// Use [`KeywordSummarizer`] when the call fails.
    pub fallback_to_keywords: bool,
}

impl Default for LlmSummarizerConfig {
    fn default() -> Self {
        Self::from(&SummarizerSettings::default())
    }
}

impl From<&SummarizerSettings> for LlmSummarizerConfig {
    fn from(settings: &SummarizerSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_output_tokens: settings.max_output_tokens,
            fallback_to_keywords: settings.fallback_to_keywords,
        }
    }
}

/// [`Summarizer`] that asks an LLM to compress the transcript.
pub struct LlmSummarizer<C: CompletionClient> {
    client: C,
    config: LlmSummarizerConfig,
    fallback: KeywordSummarizer,
}

impl<C: CompletionClient> LlmSummarizer<C> {
    /// Create a summarizer over `client`.
    pub fn new(client: C, config: LlmSummarizerConfig) -> Self {
        Self {
            client,
            config,
            fallback: KeywordSummarizer,
        }
    }

    async fn call(&self, turns: &[Turn]) -> Result<SummaryOutput, SummarizerError> {
        let request = CompletionRequest {
            instruction: COMPRESSION_INSTRUCTION.to_owned(),
            transcript: serialize_turns(turns),
            max_output_tokens: self.config.max_output_tokens,
        };
        debug!(
            turns = turns.len(),
            transcript_chars = request.transcript.len(),
            "requesting summary"
        );

        let response = tokio::time::timeout(self.config.timeout, self.client.complete(request))
            .await
            .map_err(|_| SummarizerError::Timeout {
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }
        Ok(SummaryOutput {
            summary_text: text.to_owned(),
            input_tokens_used: response.input_tokens,
            output_tokens_used: response.output_tokens,
        })
    }
}

#[async_trait]
impl<C: CompletionClient> Summarizer for LlmSummarizer<C> {
    async fn summarize(&self, turns: &[Turn]) -> Result<SummaryOutput, SummarizerError> {
        match self.call(turns).await {
            Ok(output) => Ok(output),
            Err(error) if self.config.fallback_to_keywords => {
                warn!(error = %error, "LLM summarizer failed, using keyword fallback");
                self.fallback.summarize(turns).await
            }
            Err(error) => Err(error),
        }
    }
}
