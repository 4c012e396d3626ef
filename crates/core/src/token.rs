//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers on English
//! text and code, which is enough for budget decisions; providers with a real
//! tokenizer override [`Provider::count_tokens`](crate::provider::Provider).

/// Anything that can price a piece of text in tokens.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` costs.
    fn count_tokens(&self, text: &str) -> usize;
}

/// The 4-chars-per-token heuristic as a [`Tokenizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}
