// src/summarize/mod.rs

//! Extractive summarization with incremental update and hierarchical
//! rollup. No generation: sentences are selected, never rewritten.

mod extractive;
mod hierarchical;

pub use extractive::{ExtractiveSummarizer, Summary};
pub use hierarchical::HierarchicalSummary;

/// Estimated tokens for a piece of text, ≈ chars / 4.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Sentence boundaries: `.`, `!`, `?`, and newlines. Fragments shorter
/// than `min_chars` are not sentences.
pub fn split_sentences(text: &str, min_chars: usize) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.chars().count() >= min_chars)
        .map(str::to_string)
        .collect()
}
