// src/summarize/extractive.rs
//! Embedding-scored extractive summarization.
//!
//! Sentences are scored against the centroid of their peers, weighted by
//! source importance and a length preference, then greedily selected into
//! a token budget and re-ordered chronologically.

use std::collections::BTreeSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{estimate_tokens, split_sentences};
use crate::config::SummaryConfig;
use crate::core::types::MemoryUnit;
use crate::embeddings::{dot, l2_normalize, EmbeddingGateway};
use crate::error::{MemoryError, Result};

lazy_static! {
    /// Capitalized word runs: names, products, places.
    static ref ENTITY_RE: Regex =
        Regex::new(r"\b[A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*\b").expect("entity regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex");
    static ref DATE_RE: Regex = Regex::new(
        r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2})\b"
    )
    .expect("date regex");
}

// Scoring weights: centroid similarity, source importance, length band,
// entity bonus, date bonus.
const W_CENTROID: f32 = 0.3;
const W_IMPORTANCE: f32 = 0.3;
const W_LENGTH: f32 = 0.2;
const W_ENTITY: f32 = 0.1;
const W_DATE: f32 = 0.1;

/// Output of a summarization pass.
#[derive(Debug, Clone)]
pub struct Summary {
    pub content: String,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub topics: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub source_ids: Vec<Uuid>,
    pub token_estimate: usize,
}

/// One input document for the scorer: text plus the importance it
/// inherited from its source.
#[derive(Debug, Clone)]
pub(crate) struct SourceDoc {
    pub text: String,
    pub importance: f32,
}

struct Candidate {
    text: String,
    doc_index: usize,
    sentence_index: usize,
    importance: f32,
    score: f32,
    tokens: usize,
}

pub struct ExtractiveSummarizer {
    gateway: Arc<EmbeddingGateway>,
    config: SummaryConfig,
}

impl ExtractiveSummarizer {
    pub fn new(gateway: Arc<EmbeddingGateway>, config: SummaryConfig) -> Self {
        Self { gateway, config }
    }

    /// Summarize a set of memories. Input order is treated as
    /// chronological for the output re-ordering.
    pub async fn summarize_memories(
        &self,
        memories: &[MemoryUnit],
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        let docs: Vec<SourceDoc> = memories
            .iter()
            .map(|m| SourceDoc {
                text: m.content.clone(),
                importance: m.importance,
            })
            .collect();
        let mut summary = self.summarize_docs(&docs, cancel).await?;
        summary.source_ids = memories.iter().map(|m| m.id).collect();
        for memory in memories {
            summary.topics.extend(memory.topics.iter().cloned());
        }
        Ok(summary)
    }

    /// Summarize one free-form text, e.g. a working-memory context slab.
    pub async fn summarize_text(
        &self,
        text: &str,
        importance: f32,
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        self.summarize_docs(
            &[SourceDoc {
                text: text.to_string(),
                importance,
            }],
            cancel,
        )
        .await
    }

    pub(crate) async fn summarize_docs(
        &self,
        docs: &[SourceDoc],
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let total_tokens: usize = docs.iter().map(|d| estimate_tokens(&d.text)).sum();
        let budget = ((self.config.ratio * total_tokens as f32) as usize)
            .min(self.config.max_output_tokens)
            .max(1);

        let mut candidates = self.collect_candidates(docs);
        if candidates.is_empty() {
            return Ok(Summary {
                content: String::new(),
                key_points: vec![],
                entities: extract_entities(docs, self.config.max_entities),
                topics: BTreeSet::new(),
                embedding: None,
                source_ids: vec![],
                token_estimate: 0,
            });
        }

        // Embed every candidate once, build the centroid, then score.
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let vectors = self.gateway.embed_batch(&texts, cancel).await?;
        let dims = self.gateway.dimensions();
        let mut centroid = vec![0.0f32; dims];
        for vector in &vectors {
            for (slot, value) in centroid.iter_mut().zip(vector.iter()) {
                *slot += value;
            }
        }
        l2_normalize(&mut centroid);

        for (candidate, vector) in candidates.iter_mut().zip(vectors.iter()) {
            let centroid_sim = dot(&centroid, vector).max(0.0);
            let words = candidate.text.split_whitespace().count();
            candidate.score = W_CENTROID * centroid_sim
                + W_IMPORTANCE * candidate.importance
                + W_LENGTH * length_band(words)
                + W_ENTITY * bool_bonus(ENTITY_RE.is_match(&candidate.text))
                + W_DATE * bool_bonus(DATE_RE.is_match(&candidate.text));
        }

        // Greedy selection by score, then chronological re-order.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|a, b| {
            candidates[*b]
                .score
                .partial_cmp(&candidates[*a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut selected: Vec<usize> = Vec::new();
        let mut used = 0usize;
        for idx in &order {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            if used >= budget {
                break;
            }
            selected.push(*idx);
            used += candidates[*idx].tokens;
        }
        let key_points: Vec<String> = order
            .iter()
            .take(self.config.max_key_points)
            .map(|i| candidates[*i].text.clone())
            .collect();

        selected.sort_by_key(|i| (candidates[*i].doc_index, candidates[*i].sentence_index));
        let content = selected
            .iter()
            .map(|i| candidates[*i].text.as_str())
            .collect::<Vec<_>>()
            .join(". ");

        let embedding = if content.is_empty() {
            None
        } else {
            Some(self.gateway.embed(&content, cancel).await?)
        };
        let token_estimate = estimate_tokens(&content);
        debug!(
            "extractive summary: {} of {} sentences, ~{token_estimate} tokens",
            selected.len(),
            candidates.len()
        );

        Ok(Summary {
            content,
            key_points,
            entities: extract_entities(docs, self.config.max_entities),
            topics: BTreeSet::new(),
            embedding,
            source_ids: vec![],
            token_estimate,
        })
    }

    /// Fold a new batch into an existing summary. The merge is a
    /// sentence-deduplicated concatenation; when it grows past 1.5× the
    /// prior size the union is resummarized from scratch.
    pub async fn update(
        &self,
        prior: &Summary,
        batch: &[MemoryUnit],
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        let fresh = self.summarize_memories(batch, cancel).await?;

        let mut seen: Vec<String> = split_sentences(&prior.content, 1)
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        let mut merged = prior.content.clone();
        for sentence in split_sentences(&fresh.content, 1) {
            let key = sentence.to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if !merged.is_empty() {
                merged.push_str(". ");
            }
            merged.push_str(&sentence);
        }

        let prior_tokens = estimate_tokens(&prior.content).max(1);
        if estimate_tokens(&merged) > prior_tokens * 3 / 2 {
            debug!("merged summary exceeds 1.5x prior size, resummarizing union");
            let mut resummarized = self
                .summarize_text(&merged, batch_importance(batch), cancel)
                .await?;
            resummarized.source_ids = combined_sources(prior, &fresh);
            resummarized.topics = combined_topics(prior, &fresh);
            return Ok(resummarized);
        }

        let embedding = Some(self.gateway.embed(&merged, cancel).await?);
        let mut key_points = prior.key_points.clone();
        for point in &fresh.key_points {
            if !key_points.contains(point) && key_points.len() < self.config.max_key_points {
                key_points.push(point.clone());
            }
        }
        let mut entities = prior.entities.clone();
        for entity in &fresh.entities {
            if !entities.contains(entity) && entities.len() < self.config.max_entities {
                entities.push(entity.clone());
            }
        }
        let token_estimate = estimate_tokens(&merged);

        Ok(Summary {
            content: merged,
            key_points,
            entities,
            topics: combined_topics(prior, &fresh),
            embedding,
            source_ids: combined_sources(prior, &fresh),
            token_estimate,
        })
    }

    fn collect_candidates(&self, docs: &[SourceDoc]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (doc_index, doc) in docs.iter().enumerate() {
            for (sentence_index, text) in
                split_sentences(&doc.text, self.config.min_sentence_chars)
                    .into_iter()
                    .enumerate()
            {
                let tokens = estimate_tokens(&text);
                out.push(Candidate {
                    text,
                    doc_index,
                    sentence_index,
                    importance: doc.importance,
                    score: 0.0,
                    tokens,
                });
            }
        }
        out
    }
}

/// Triangular preference over sentence length in words: full weight in
/// the 5–25 band, linear falloff outside it.
fn length_band(words: usize) -> f32 {
    let w = words as f32;
    if w < 5.0 {
        (w / 5.0).max(0.0)
    } else if w <= 25.0 {
        1.0
    } else {
        ((45.0 - w) / 20.0).clamp(0.0, 1.0)
    }
}

fn bool_bonus(hit: bool) -> f32 {
    if hit {
        1.0
    } else {
        0.0
    }
}

fn extract_entities(docs: &[SourceDoc], max: usize) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for doc in docs {
        for m in ENTITY_RE.find_iter(&doc.text) {
            let entity = m.as_str().to_string();
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
        for m in EMAIL_RE.find_iter(&doc.text) {
            let entity = m.as_str().to_string();
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
    }
    entities.truncate(max);
    entities
}

fn batch_importance(batch: &[MemoryUnit]) -> f32 {
    if batch.is_empty() {
        return 0.5;
    }
    batch.iter().map(|m| m.importance).sum::<f32>() / batch.len() as f32
}

fn combined_sources(prior: &Summary, fresh: &Summary) -> Vec<Uuid> {
    let mut ids = prior.source_ids.clone();
    for id in &fresh.source_ids {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    ids
}

fn combined_topics(prior: &Summary, fresh: &Summary) -> BTreeSet<String> {
    prior
        .topics
        .iter()
        .chain(fresh.topics.iter())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embeddings::HashedEmbedder;

    const DIMS: usize = 64;

    fn summarizer() -> ExtractiveSummarizer {
        let gateway = Arc::new(EmbeddingGateway::new(
            Arc::new(HashedEmbedder::new(DIMS)),
            EmbeddingConfig {
                dimensions: DIMS,
                ..Default::default()
            },
        ));
        ExtractiveSummarizer::new(gateway, SummaryConfig::default())
    }

    fn memory(content: &str, importance: f32) -> MemoryUnit {
        let mut m = MemoryUnit::new("t", content).with_importance(importance);
        m.id = Uuid::new_v4();
        m
    }

    #[tokio::test]
    async fn test_summary_is_smaller_than_source() {
        let summarizer = summarizer();
        let memories: Vec<MemoryUnit> = (0..12)
            .map(|n| {
                memory(
                    &format!(
                        "Status update number {n} covered deployment progress and the \
                         remaining migration work for the storage cluster."
                    ),
                    0.5,
                )
            })
            .collect();

        let summary = summarizer
            .summarize_memories(&memories, &CancellationToken::new())
            .await
            .unwrap();

        let source_tokens: usize = memories.iter().map(|m| estimate_tokens(&m.content)).sum();
        assert!(summary.token_estimate < source_tokens);
        assert!(!summary.content.is_empty());
        assert!(summary.embedding.is_some());
        assert_eq!(summary.source_ids.len(), 12);
    }

    #[tokio::test]
    async fn test_key_points_bounded_at_five() {
        let summarizer = summarizer();
        let memories: Vec<MemoryUnit> = (0..10)
            .map(|n| memory(&format!("Long enough observation number {n} about the system"), 0.5))
            .collect();
        let summary = summarizer
            .summarize_memories(&memories, &CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.key_points.len() <= 5);
    }

    #[tokio::test]
    async fn test_entities_include_names_and_emails() {
        let summarizer = summarizer();
        let memories = vec![memory(
            "Francesca Rossi shared the rollout plan, contact her at francesca@example.com",
            0.8,
        )];
        let summary = summarizer
            .summarize_memories(&memories, &CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.entities.iter().any(|e| e == "Francesca Rossi"));
        assert!(summary
            .entities
            .iter()
            .any(|e| e == "francesca@example.com"));
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_summary() {
        let summarizer = summarizer();
        let summary = summarizer
            .summarize_memories(&[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.content.is_empty());
        assert_eq!(summary.token_estimate, 0);
    }

    #[tokio::test]
    async fn test_incremental_update_deduplicates_sentences() {
        let summarizer = summarizer();
        let first = vec![memory(
            "The deployment finished on Tuesday without incident or rollback.",
            0.6,
        )];
        let prior = summarizer
            .summarize_memories(&first, &CancellationToken::new())
            .await
            .unwrap();

        let updated = summarizer
            .update(&prior, &first, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            updated
                .content
                .matches("deployment finished on Tuesday")
                .count(),
            1
        );
    }

    #[test]
    fn test_length_band_shape() {
        assert!(length_band(1) < length_band(10));
        assert!((length_band(15) - 1.0).abs() < f32::EPSILON);
        assert!(length_band(44) < 0.1);
    }
}
