//! Core constants.

/// Approximate characters per token used by the estimator.
///
/// Deliberately coarse. Provider tokenizers differ; only determinism and
/// monotonicity matter to callers.
pub const CHARS_PER_TOKEN: usize = 3;

/// Smallest estimate returned for any text, including the empty string.
pub const MIN_TOKEN_ESTIMATE: u32 = 1;
