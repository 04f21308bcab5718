//! Fixed strings and limits shared by the compaction pipeline.

/// Prefix of the synthetic USER turn that carries an earlier summary.
pub const PRIOR_CONTEXT_PREFIX: &str = "prior context: ";

/// Text of the synthetic ASSISTANT turn that follows [`PRIOR_CONTEXT_PREFIX`].
pub const COMPACTION_ACK_TEXT: &str = "acknowledged";

/// Header separating base instructions from an appended summary in a SYSTEM turn.
pub const SUMMARY_BLOCK_HEADER: &str = "[Summary of earlier conversation]";

/// Header of the block returned by
/// [`ContextManager::get_memory_context_for_next_request`](crate::ContextManager::get_memory_context_for_next_request).
pub const MEMORY_CONTEXT_HEADER: &str = "[Memory from previous conversations]";

/// Instruction sent with every LLM summarization request.
pub const COMPRESSION_INSTRUCTION: &str = "Compress the conversation transcript below into a short \
summary written in the third person. Keep facts the user stated about themselves, their goals, \
open questions, and decisions already made. Drop greetings and filler. Reply with the summary \
text only.";

/// Per-request clip applied by the keyword summarizer.
pub const KEYWORD_REQUEST_LIMIT: usize = 200;

/// Per-turn clip for assistant text in a serialized transcript.
pub const TRANSCRIPT_ASSISTANT_TEXT_LIMIT: usize = 300;

/// Cap on a whole serialized transcript, in characters.
pub const TRANSCRIPT_MAX_CHARS: usize = 24_000;
