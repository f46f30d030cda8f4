// src/compress/mod.rs

//! Context compression: token and sentence pruning with importance
//! weights. Selection always keeps the highest-scoring material up to
//! the target, then restores the original order.

use std::collections::HashSet;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::summarize::{estimate_tokens, split_sentences};

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "do", "does",
        "did", "have", "has", "had", "of", "in", "on", "at", "to", "for", "with", "by", "from",
        "as", "that", "this", "these", "those", "it", "its", "and", "or", "but", "so", "very",
        "just", "quite", "rather", "really", "some", "any", "about",
    ]
    .into_iter()
    .collect();

    /// Stop words that flip meaning or carry obligation stay in place.
    static ref PROTECTED_WORDS: HashSet<&'static str> = [
        "not", "no", "never", "must", "cannot", "won't", "don't", "always", "only", "critical",
        "important", "urgent",
    ]
    .into_iter()
    .collect();
}

// Token importance weights: positional, type, structural, semantic
// placeholder.
const W_POSITIONAL: f32 = 0.2;
const W_TYPE: f32 = 0.1;
const W_STRUCTURAL: f32 = 0.3;
const W_SEMANTIC: f32 = 0.4;
const SEMANTIC_PLACEHOLDER: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    TokenPruning,
    SentencePruning,
    /// Sentence pruning first, token pruning on the residual.
    Hybrid,
    /// Stop-word removal with a protected-word allowlist.
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct CompressionOptions {
    pub strategy: CompressionStrategy,
    /// Fraction of the original token estimate to keep, in (0, 1].
    pub target_ratio: f32,
    pub preserve_sentence_structure: bool,
    pub required_keywords: Vec<String>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            strategy: CompressionStrategy::Hybrid,
            target_ratio: 0.5,
            preserve_sentence_structure: true,
            required_keywords: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub compressed: String,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// Achieved ratio, compressed / original.
    pub ratio: f32,
}

#[derive(Default)]
pub struct Compressor;

impl Compressor {
    pub fn new() -> Self {
        Self
    }

    pub fn compress(&self, text: &str, opts: &CompressionOptions) -> CompressionResult {
        let original_tokens = estimate_tokens(text);
        let ratio = opts.target_ratio.clamp(0.01, 1.0);

        let compressed = match opts.strategy {
            CompressionStrategy::TokenPruning => prune_tokens(text, ratio, opts),
            CompressionStrategy::SentencePruning => prune_sentences(text, ratio, opts),
            CompressionStrategy::Hybrid => {
                let intermediate = prune_sentences(text, ratio.sqrt(), opts);
                prune_tokens(&intermediate, ratio.sqrt(), opts)
            }
            CompressionStrategy::Heuristic => strip_stop_words(text, opts),
        };

        let compressed_tokens = estimate_tokens(&compressed);
        CompressionResult {
            ratio: if original_tokens > 0 {
                compressed_tokens as f32 / original_tokens as f32
            } else {
                1.0
            },
            compressed,
            original_tokens,
            compressed_tokens,
        }
    }
}

/// Keep the highest-scoring words up to the target count, in their
/// original order.
fn prune_tokens(text: &str, ratio: f32, opts: &CompressionOptions) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let keep = ((words.len() as f32 * ratio).ceil() as usize).clamp(1, words.len());

    let sentence_bounds = sentence_boundaries(&words);
    let mut scored: Vec<(usize, f32)> = words
        .iter()
        .enumerate()
        .map(|(i, word)| (i, token_score(word, i, &sentence_bounds, opts)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut kept: Vec<usize> = scored.iter().take(keep).map(|(i, _)| *i).collect();
    kept.sort_unstable();
    kept.into_iter()
        .map(|i| words[i])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Indices at which words end a sentence (terminal punctuation).
fn sentence_boundaries(words: &[&str]) -> Vec<bool> {
    words
        .iter()
        .map(|w| w.ends_with(['.', '!', '?']))
        .collect()
}

fn token_score(word: &str, index: usize, bounds: &[bool], opts: &CompressionOptions) -> f32 {
    let at_start = index == 0 || (index > 0 && bounds[index - 1]);
    let at_end = bounds.get(index).copied().unwrap_or(false);
    let positional = if at_start || at_end { 1.0 } else { 0.4 };

    let bare: String = word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let is_entity = word.chars().next().is_some_and(|c| c.is_uppercase());
    let is_numeric = bare.chars().any(|c| c.is_ascii_digit());
    let is_required = opts
        .required_keywords
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&bare));
    let type_score = if is_required {
        1.0
    } else if is_entity || is_numeric {
        0.8
    } else {
        0.2
    };

    let has_punct = word.ends_with(['.', '!', '?', ',', ';', ':']);
    let structural = if has_punct && opts.preserve_sentence_structure {
        1.0
    } else if has_punct {
        0.5
    } else {
        0.3
    };

    W_POSITIONAL * positional
        + W_TYPE * type_score
        + W_STRUCTURAL * structural
        + W_SEMANTIC * SEMANTIC_PLACEHOLDER
}

/// Keep the highest-scoring sentences within the token budget, in order.
fn prune_sentences(text: &str, ratio: f32, opts: &CompressionOptions) -> String {
    let sentences = split_sentences(text, 1);
    if sentences.len() <= 1 {
        return text.trim().to_string();
    }
    let total_tokens: usize = sentences.iter().map(|s| estimate_tokens(s)).sum();
    let budget = ((total_tokens as f32 * ratio).ceil() as usize).max(1);

    let last = sentences.len() - 1;
    let mut order: Vec<usize> = (0..sentences.len()).collect();
    let scores: Vec<f32> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| sentence_score(s, i, last, opts))
        .collect();
    order.sort_by(|a, b| {
        scores[*b]
            .partial_cmp(&scores[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    let mut kept = Vec::new();
    let mut used = 0usize;
    for idx in order {
        if used >= budget {
            break;
        }
        used += estimate_tokens(&sentences[idx]);
        kept.push(idx);
    }
    kept.sort_unstable();
    kept.into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(". ")
}

fn sentence_score(sentence: &str, index: usize, last: usize, opts: &CompressionOptions) -> f32 {
    // Lead and closing sentences carry disproportionate signal.
    let positional = if index == 0 || index == last { 1.0 } else { 0.5 };
    let words = sentence.split_whitespace().count() as f32;
    let length = if (5.0..=25.0).contains(&words) {
        1.0
    } else {
        0.5
    };
    let lowercase = sentence.to_lowercase();
    let keyword = if opts
        .required_keywords
        .iter()
        .any(|k| lowercase.contains(&k.to_lowercase()))
    {
        1.0
    } else {
        0.0
    };
    0.4 * positional + 0.3 * length + 0.3 * keyword
}

/// Drop generic stop words, keeping protected and required words intact.
fn strip_stop_words(text: &str, opts: &CompressionOptions) -> String {
    text.split_whitespace()
        .filter(|word| {
            let bare: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if PROTECTED_WORDS.contains(bare.as_str()) {
                return true;
            }
            if opts
                .required_keywords
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&bare))
            {
                return true;
            }
            !STOP_WORDS.contains(bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "The deployment pipeline failed on Tuesday at 14:30. \
        Rollback was triggered automatically by the watchdog. \
        The root cause was a missing configuration value in the staging manifest. \
        Engineers patched the manifest and redeployed within the hour.";

    fn opts(strategy: CompressionStrategy, ratio: f32) -> CompressionOptions {
        CompressionOptions {
            strategy,
            target_ratio: ratio,
            ..Default::default()
        }
    }

    // ============================================================================
    // Token pruning tests
    // ============================================================================

    #[test]
    fn test_token_pruning_reduces_size() {
        let result = Compressor::new().compress(SAMPLE, &opts(CompressionStrategy::TokenPruning, 0.4));
        assert!(result.compressed_tokens < result.original_tokens);
        assert!(!result.compressed.is_empty());
    }

    #[test]
    fn test_token_pruning_preserves_order() {
        let result =
            Compressor::new().compress("Alice met Bob before Carol arrived", &opts(CompressionStrategy::TokenPruning, 0.6));
        let alice = result.compressed.find("Alice");
        let carol = result.compressed.find("Carol");
        if let (Some(a), Some(c)) = (alice, carol) {
            assert!(a < c);
        }
    }

    #[test]
    fn test_required_keywords_survive_pruning() {
        let mut options = opts(CompressionStrategy::TokenPruning, 0.3);
        options.required_keywords = vec!["watchdog".to_string()];
        let result = Compressor::new().compress(SAMPLE, &options);
        assert!(result.compressed.to_lowercase().contains("watchdog"));
    }

    // ============================================================================
    // Sentence pruning tests
    // ============================================================================

    #[test]
    fn test_sentence_pruning_keeps_whole_sentences() {
        let result =
            Compressor::new().compress(SAMPLE, &opts(CompressionStrategy::SentencePruning, 0.5));
        // Output is a subset of source sentences.
        for sentence in split_sentences(&result.compressed, 1) {
            assert!(SAMPLE.contains(sentence.trim_end_matches('.')));
        }
    }

    #[test]
    fn test_single_sentence_is_untouched_by_sentence_pruning() {
        let text = "only one sentence here";
        let result =
            Compressor::new().compress(text, &opts(CompressionStrategy::SentencePruning, 0.2));
        assert_eq!(result.compressed, text);
    }

    // ============================================================================
    // Hybrid and heuristic tests
    // ============================================================================

    #[test]
    fn test_hybrid_compresses_harder_than_sentence_alone() {
        let compressor = Compressor::new();
        let hybrid = compressor.compress(SAMPLE, &opts(CompressionStrategy::Hybrid, 0.3));
        assert!(hybrid.compressed_tokens < hybrid.original_tokens);
    }

    #[test]
    fn test_heuristic_keeps_negations() {
        let result = Compressor::new().compress(
            "The cache is not a source of truth and must never be trusted",
            &opts(CompressionStrategy::Heuristic, 0.5),
        );
        assert!(result.compressed.contains("not"));
        assert!(result.compressed.contains("never"));
        assert!(result.compressed.contains("must"));
        assert!(!result.compressed.contains(" a "));
    }

    #[test]
    fn test_empty_input() {
        let result = Compressor::new().compress("", &opts(CompressionStrategy::TokenPruning, 0.5));
        assert_eq!(result.compressed, "");
        assert_eq!(result.original_tokens, 0);
    }
}
