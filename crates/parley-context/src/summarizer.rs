//! The summarization seam.
//!
//! [`Summarizer`] is the only way the engine turns turns into text. This
//! module also holds the offline [`KeywordSummarizer`] and the transcript
//! serializer shared with [`LlmSummarizer`](crate::LlmSummarizer).

use async_trait::async_trait;
use parley_core::{Role, Turn};

use crate::constants::{
    KEYWORD_REQUEST_LIMIT, PRIOR_CONTEXT_PREFIX, TRANSCRIPT_ASSISTANT_TEXT_LIMIT,
    TRANSCRIPT_MAX_CHARS,
};
use crate::errors::SummarizerError;
use crate::types::SummaryOutput;

// =============================================================================
// Summarizer Trait
// =============================================================================

/// Produces a short summary of a run of turns.
///
/// Implementations own their timeouts. The engine treats a blank summary as
/// a failure regardless of what the implementation returns.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `turns` in order.
    async fn summarize(&self, turns: &[Turn]) -> Result<SummaryOutput, SummarizerError>;
}

// =============================================================================
// Keyword Summarizer
// =============================================================================

/// Deterministic offline summarizer.
///
/// Carries earlier summaries (`prior context:` turns) through verbatim and
/// lists clipped user requests. Assistant turns are ignored. Reports no
/// token usage.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordSummarizer;

impl KeywordSummarizer {
    /// Create a keyword summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the summary synchronously.
    #[must_use]
    pub fn summarize_now(&self, turns: &[Turn]) -> String {
        let mut prior = Vec::new();
        let mut requests = Vec::new();

        for turn in turns.iter().filter(|t| t.is_user()) {
            let text = turn.text().trim();
            if let Some(earlier) = text.strip_prefix(PRIOR_CONTEXT_PREFIX.trim_end()) {
                let earlier = earlier.trim();
                if !earlier.is_empty() {
                    prior.push(earlier.to_owned());
                }
            } else if !text.is_empty() {
                requests.push(truncate(text, KEYWORD_REQUEST_LIMIT));
            }
        }

        if prior.is_empty() && requests.is_empty() {
            return format!("({} turns summarized)", turns.len());
        }

        let mut parts = Vec::new();
        if !prior.is_empty() {
            parts.push(format!("Earlier context: {}", prior.join(" ")));
        }
        if !requests.is_empty() {
            parts.push(format!("The user made {} requests.", requests.len()));
            parts.push(format!("Key requests: {}", requests.join("; ")));
        }
        parts.join(" ")
    }
}

#[async_trait]
impl Summarizer for KeywordSummarizer {
    async fn summarize(&self, turns: &[Turn]) -> Result<SummaryOutput, SummarizerError> {
        Ok(SummaryOutput::offline(self.summarize_now(turns)))
    }
}

// =============================================================================
// Transcript Serialization
// =============================================================================

/// Serialize turns into a line-based transcript.
///
/// ```text
/// [SYSTEM] text...
/// [USER] text...
/// [ASSISTANT] text... (clipped)
/// ```
///
/// Blank turns are skipped. A transcript longer than
/// [`TRANSCRIPT_MAX_CHARS`] keeps its first and last quarter around an
/// omission marker.
#[must_use]
pub fn serialize_turns(turns: &[Turn]) -> String {
    let lines: Vec<String> = turns
        .iter()
        .filter(|t| !t.text().trim().is_empty())
        .map(|turn| {
            let text = match turn.role() {
                Role::Assistant => truncate(turn.text(), TRANSCRIPT_ASSISTANT_TEXT_LIMIT),
                Role::User | Role::System => turn.text().to_owned(),
            };
            format!("[{}] {text}", turn.role().label())
        })
        .collect();
    cap_transcript(&lines.join("\n"), TRANSCRIPT_MAX_CHARS)
}

fn cap_transcript(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_owned();
    }
    let quarter = max_chars / 4;
    let head: String = text.chars().take(quarter).collect();
    let tail: String = text.chars().skip(total - quarter).collect();
    let omitted = total - 2 * quarter;
    format!("{head}\n[... {omitted} characters omitted ...]\n{tail}")
}

/// Clip `s` to at most `max_chars` characters, ending in `...` when clipped.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- KeywordSummarizer --

    #[tokio::test]
    async fn keyword_lists_user_requests() {
        let turns = [
            Turn::user("Book a table for two"),
            Turn::assistant("Which evening?"),
            Turn::user("Friday"),
        ];
        let out = KeywordSummarizer.summarize(&turns).await.unwrap();
        assert_eq!(
            out.summary_text,
            "The user made 2 requests. Key requests: Book a table for two; Friday"
        );
        assert_eq!(out.input_tokens_used, 0);
        assert_eq!(out.output_tokens_used, 0);
    }

    #[tokio::test]
    async fn keyword_carries_prior_context() {
        let turns = [
            Turn::user(format!("{PRIOR_CONTEXT_PREFIX}user is vegetarian")),
            Turn::user("suggest a recipe"),
        ];
        let out = KeywordSummarizer.summarize(&turns).await.unwrap();
        assert!(out.summary_text.starts_with("Earlier context: user is vegetarian"));
        assert!(out.summary_text.contains("suggest a recipe"));
    }

    #[tokio::test]
    async fn keyword_without_user_turns() {
        let turns = [Turn::assistant("hello"), Turn::assistant("anyone?")];
        let out = KeywordSummarizer.summarize(&turns).await.unwrap();
        assert_eq!(out.summary_text, "(2 turns summarized)");
    }

    #[test]
    fn keyword_clips_long_requests() {
        let long = "x".repeat(KEYWORD_REQUEST_LIMIT * 2);
        let summary = KeywordSummarizer::new().summarize_now(&[Turn::user(long)]);
        let request = summary.strip_prefix("The user made 1 requests. Key requests: ").unwrap();
        assert_eq!(request.chars().count(), KEYWORD_REQUEST_LIMIT);
        assert!(request.ends_with("..."));
    }

    // -- serialize_turns --

    #[test]
    fn serialize_empty() {
        assert!(serialize_turns(&[]).is_empty());
    }

    #[test]
    fn serialize_labels_roles() {
        let turns = [
            Turn::system("rules"),
            Turn::user("hi"),
            Turn::assistant("hello"),
        ];
        assert_eq!(
            serialize_turns(&turns),
            "[SYSTEM] rules\n[USER] hi\n[ASSISTANT] hello"
        );
    }

    #[test]
    fn serialize_skips_blank_turns() {
        let turns = [Turn::user("a"), Turn::assistant("  "), Turn::user("b")];
        assert_eq!(serialize_turns(&turns), "[USER] a\n[USER] b");
    }

    #[test]
    fn serialize_clips_assistant_text() {
        let turns = [Turn::assistant("a".repeat(500))];
        let out = serialize_turns(&turns);
        let content = out.strip_prefix("[ASSISTANT] ").unwrap();
        assert_eq!(content.chars().count(), TRANSCRIPT_ASSISTANT_TEXT_LIMIT);
    }

    #[test]
    fn serialize_keeps_user_text_whole() {
        let text = "u".repeat(1_000);
        let out = serialize_turns(&[Turn::user(text.clone())]);
        assert_eq!(out, format!("[USER] {text}"));
    }

    #[test]
    fn cap_keeps_head_and_tail() {
        let text = format!("{}{}", "h".repeat(60), "t".repeat(60));
        let capped = cap_transcript(&text, 40);
        assert!(capped.starts_with(&"h".repeat(10)));
        assert!(capped.ends_with(&"t".repeat(10)));
        assert!(capped.contains("[... 100 characters omitted ...]"));
    }

    #[test]
    fn cap_is_char_safe() {
        let text = "é".repeat(100);
        let capped = cap_transcript(&text, 20);
        assert!(capped.starts_with("ééééé\n"));
    }

    #[test]
    fn truncate_short_is_identity() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
