//! Ordered turn history for one provider.
//!
//! [`ConversationHistory`] keeps two invariants on every mutation:
//!
//! - a SYSTEM turn, if present, is at index 0 and nowhere else
//! - the first turn is never a USER turn with blank text
//!
//! Token totals come from the estimate each [`Turn`] caches at construction,
//! so nothing is re-estimated when totals are read.
//!
//! The history also answers for pending-log entries: those of its journaled
//! user turns, plus any whose turns were compacted into a summary that has
//! not been saved to memory yet.

use parley_core::{Role, Turn};

/// Ordered turns with a fixed position for the system prompt.
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    folded_journal: Vec<i64>,
}

impl ConversationHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history holding only a system prompt.
    #[must_use]
    pub fn with_system_prompt(text: &str) -> Self {
        let mut history = Self::new();
        history.set_system_text(text);
        history
    }

    /// Append a turn.
    ///
    /// SYSTEM turns replace the current system prompt instead of appending.
    /// Blank USER turns at the head of an otherwise empty history are dropped.
    pub fn push(&mut self, turn: Turn) {
        match turn.role() {
            Role::System => self.set_system_turn(turn),
            Role::User if turn.text().trim().is_empty() && self.non_system_count() == 0 => {}
            _ => self.turns.push(turn),
        }
    }

    /// Replace the system prompt text, inserting a SYSTEM turn if none exists.
    pub fn set_system_text(&mut self, text: &str) {
        self.set_system_turn(Turn::system(text));
    }

    fn set_system_turn(&mut self, turn: Turn) {
        if self.system_turn().is_some() {
            self.turns[0] = turn;
        } else {
            self.turns.insert(0, turn);
        }
    }

    /// Remove the SYSTEM turn, if any.
    pub fn clear_system(&mut self) {
        if self.system_turn().is_some() {
            let _ = self.turns.remove(0);
        }
    }

    /// Replace every turn, e.g. with a compacted history.
    ///
    /// A SYSTEM turn anywhere in `turns` becomes the system prompt.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns.clear();
        for turn in turns {
            self.push(turn);
        }
    }

    /// Journal entries whose turns now live only inside this history's summary.
    #[must_use]
    pub fn folded_journal(&self) -> &[i64] {
        &self.folded_journal
    }

    /// Record which journal entries the in-history summary covers unsaved.
    pub fn set_folded_journal(&mut self, seqs: Vec<i64>) {
        self.folded_journal = seqs;
    }

    /// Every pending-log entry this history accounts for, folded ones first.
    #[must_use]
    pub fn journal_seqs(&self) -> Vec<i64> {
        self.folded_journal
            .iter()
            .copied()
            .chain(self.turns.iter().filter_map(Turn::journal_seq))
            .collect()
    }

    /// All turns.
    #[must_use]
    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    /// The SYSTEM turn, if any.
    #[must_use]
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.first().filter(|t| t.is_system())
    }

    /// Turns after the system prompt.
    #[must_use]
    pub fn non_system_turns(&self) -> &[Turn] {
        let start = usize::from(self.system_turn().is_some());
        &self.turns[start..]
    }

    /// Number of non-system turns.
    #[must_use]
    pub fn non_system_count(&self) -> usize {
        self.non_system_turns().len()
    }

    /// USER turns in order.
    #[must_use]
    pub fn user_turns(&self) -> Vec<Turn> {
        self.turns.iter().filter(|t| t.is_user()).cloned().collect()
    }

    /// Number of USER turns.
    #[must_use]
    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_user()).count()
    }

    /// Sum of cached token estimates.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        parley_core::token_estimator::estimate_turns(&self.turns)
    }

    /// Number of turns, system prompt included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history holds no turns at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
