// src/search/expansion.rs
//! Deterministic, lexicon-driven query expansion.
//!
//! No model calls here: a fixed synonym table widens the sparse query and
//! a handful of prefix rewrites produce paraphrase variants for the dense
//! side. Same input, same expansion, every time.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::bm25::tokenize;

/// Symmetric synonym pairs. Kept deliberately small; the goal is recall
/// on common phrasing drift, not a thesaurus.
const SYNONYM_PAIRS: &[(&str, &str)] = &[
    ("feature", "functionality"),
    ("team", "colleague"),
    ("bug", "defect"),
    ("error", "failure"),
    ("fast", "quick"),
    ("slow", "sluggish"),
    ("save", "conserve"),
    ("delete", "remove"),
    ("start", "begin"),
    ("finish", "complete"),
    ("meeting", "discussion"),
    ("deadline", "due"),
    ("issue", "problem"),
    ("fix", "repair"),
    ("improve", "optimize"),
];

/// Prefix rewrites used to build paraphrase variants.
const PREFIX_REWRITES: &[(&str, &str)] = &[
    ("what is", "show me"),
    ("what are", "show me"),
    ("how to", "ways to"),
    ("how do i", "how to"),
    ("how can i", "how to"),
    ("tell me about", "describe"),
    ("show me", "what is"),
    ("find", "search for"),
];

lazy_static! {
    static ref SYNONYMS: HashMap<&'static str, Vec<&'static str>> = {
        let mut map: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        for &(a, b) in SYNONYM_PAIRS {
            map.entry(a).or_default().push(b);
            map.entry(b).or_default().push(a);
        }
        map
    };
}

/// Result of expanding a raw query.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    /// Original tokens plus their synonyms, joined — fed to BM25.
    pub sparse_query: String,
    /// Paraphrase variants for dense retrieval. The original query is
    /// always first.
    pub variants: Vec<String>,
}

pub struct QueryExpander {
    /// Total dense variants produced, original included.
    max_variants: usize,
}

impl QueryExpander {
    pub fn new(max_variants: usize) -> Self {
        Self {
            max_variants: max_variants.max(1),
        }
    }

    pub fn expand(&self, query: &str) -> ExpandedQuery {
        let normalized = query.trim().to_lowercase();
        let tokens = tokenize(&normalized);

        // Sparse side: widen with synonyms, preserving token order and
        // appending each synonym once.
        let mut sparse_terms: Vec<String> = tokens.clone();
        for token in &tokens {
            if let Some(alternates) = SYNONYMS.get(token.as_str()) {
                for alt in alternates {
                    if !sparse_terms.iter().any(|t| t == alt) {
                        sparse_terms.push((*alt).to_string());
                    }
                }
            }
        }

        // Dense side: original first, then prefix rewrites, then a
        // synonym-substituted rendition.
        let mut variants = vec![normalized.clone()];
        for &(prefix, replacement) in PREFIX_REWRITES {
            if variants.len() >= self.max_variants {
                break;
            }
            if let Some(rest) = strip_phrase_prefix(&normalized, prefix) {
                let candidate = format!("{replacement} {rest}");
                if !variants.contains(&candidate) {
                    variants.push(candidate);
                }
            }
        }
        if variants.len() < self.max_variants {
            let substituted: Vec<String> = tokens
                .iter()
                .map(|t| {
                    SYNONYMS
                        .get(t.as_str())
                        .and_then(|alts| alts.first())
                        .map(|alt| (*alt).to_string())
                        .unwrap_or_else(|| t.clone())
                })
                .collect();
            let candidate = substituted.join(" ");
            if !candidate.is_empty() && !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
        variants.truncate(self.max_variants);

        ExpandedQuery {
            sparse_query: sparse_terms.join(" "),
            variants,
        }
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Strip `prefix` (a word sequence) from the front of `text`, requiring a
/// word boundary after it. Returns the remainder.
fn strip_phrase_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    rest.strip_prefix(' ')
}
