//! Conversation turns.
//!
//! A [`Turn`] is one message authored by the user, the assistant, or the
//! system. Turns are immutable once created: the token estimate is computed
//! at construction and cached, and no setter exists. History only ever grows
//! by appending and shrinks by bulk replacement during compaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token_estimator;

/// Author of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Model output.
    Assistant,
    /// Instructions for the model; only ever at index 0 of a history.
    System,
}

impl Role {
    /// Upper-case label used in serialized transcripts.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
            Self::System => "SYSTEM",
        }
    }
}

/// One immutable message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    role: Role,
    text: String,
    estimated_tokens: u32,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    journal_seq: Option<i64>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::at(role, text, Utc::now())
    }

    /// Create a turn with an explicit timestamp.
    #[must_use]
    pub fn at(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let text = text.into();
        let estimated_tokens = token_estimator::estimate(&text);
        Self {
            role,
            text,
            estimated_tokens,
            timestamp,
            journal_seq: None,
        }
    }

    /// This turn, tagged with the pending-log entry that journals it.
    #[must_use]
    pub fn with_journal_seq(mut self, seq: i64) -> Self {
        self.journal_seq = Some(seq);
        self
    }

    /// Create a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a system turn.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// The author of this turn.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The turn text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cached token estimate of [`Self::text`].
    #[must_use]
    pub fn estimated_tokens(&self) -> u32 {
        self.estimated_tokens
    }

    /// Creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Sequence number of the pending-log entry holding this turn, if it was journaled.
    #[must_use]
    pub fn journal_seq(&self) -> Option<i64> {
        self.journal_seq
    }

    /// Whether this is a system turn.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Whether this is a user turn.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_role() {
        assert_eq!(Turn::user("u").role(), Role::User);
        assert_eq!(Turn::assistant("a").role(), Role::Assistant);
        assert_eq!(Turn::system("s").role(), Role::System);
    }

    #[test]
    fn estimate_cached_at_construction() {
        let turn = Turn::user("x".repeat(90));
        assert_eq!(turn.estimated_tokens(), 30);
    }

    #[test]
    fn explicit_timestamp_preserved() {
        let ts = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let turn = Turn::at(Role::Assistant, "hi", ts);
        assert_eq!(turn.timestamp(), ts);
    }

    #[test]
    fn role_predicates() {
        assert!(Turn::system("s").is_system());
        assert!(!Turn::user("u").is_system());
        assert!(Turn::user("u").is_user());
    }

    #[test]
    fn role_labels() {
        assert_eq!(Role::User.label(), "USER");
        assert_eq!(Role::Assistant.label(), "ASSISTANT");
        assert_eq!(Role::System.label(), "SYSTEM");
    }

    #[test]
    fn serde_uses_camel_case_and_lowercase_roles() {
        let turn = Turn::user("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["text"], "hello");
        assert!(json.get("estimatedTokens").is_some());
        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn journal_seq_is_process_local() {
        let turn = Turn::user("hello").with_journal_seq(7);
        assert_eq!(turn.journal_seq(), Some(7));
        assert_eq!(turn.clone().journal_seq(), Some(7));

        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("journalSeq").is_none());
        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back.journal_seq(), None);
    }
}
