//! Token estimation.
//!
//! Pure functions approximating token counts as `max(1, round(chars / 3))`.
//! Exactness is not a goal. Callers rely on two properties only:
//!
//! - **Determinism**: the same text always yields the same estimate.
//! - **Monotonicity**: extending a text never lowers its estimate.
//!
//! Length is measured in Unicode scalar values so multi-byte text is not
//! over-counted relative to ASCII.

use crate::constants::{CHARS_PER_TOKEN, MIN_TOKEN_ESTIMATE};
use crate::turns::Turn;

/// Convert a character count to tokens, rounding to nearest.
///
/// `chars / 3` never lands on exactly `.5`, so `(chars + 1) / 3` is the
/// rounded value in integer arithmetic.
#[allow(clippy::cast_possible_truncation)]
fn chars_to_tokens(chars: usize) -> u32 {
    let rounded = (chars.saturating_add(1) / CHARS_PER_TOKEN).min(u32::MAX as usize) as u32;
    rounded.max(MIN_TOKEN_ESTIMATE)
}

/// Estimate the token count of a piece of text.
#[must_use]
pub fn estimate(text: &str) -> u32 {
    chars_to_tokens(text.chars().count())
}

/// Sum the cached estimates of a slice of turns.
#[must_use]
pub fn estimate_turns(turns: &[Turn]) -> u64 {
    turns.iter().map(|t| u64::from(t.estimated_tokens())).sum()
}
