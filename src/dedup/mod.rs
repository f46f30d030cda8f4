// src/dedup/mod.rs
//! Duplicate detection: exact content hashing and semantic similarity.
//!
//! The checker only decides — it never stores, merges, or raises
//! Conflict. Callers act on the returned recommendation.

mod merge;

pub(crate) use merge::combine_texts;
pub use merge::{DuplicateGroup, MergeEngine, MergeReport, MergeStrategy};

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SearchConfig;
use crate::core::traits::MemoryStore;
use crate::core::types::{MemoryFilter, MemoryUnit, SearchOptions};
use crate::error::{MemoryError, Result};

/// Hex SHA-256 over normalized content. Normalization: lowercase, trim
/// ASCII whitespace at both ends, `\r\n` and bare `\r` to `\n`. Two texts
/// that differ only in case, edge whitespace, or line endings hash
/// identically.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_for_hash(content);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

fn normalize_for_hash(content: &str) -> String {
    content
        .to_lowercase()
        .trim_matches(|c: char| c.is_ascii_whitespace())
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateType {
    Exact,
    Semantic,
}

/// What the ingest path should do with the incoming content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateAction {
    /// No duplicate: store normally.
    Add,
    /// Near-identical to an existing record: drop the new one.
    Skip,
    /// Same meaning but materially longer: replace the existing content.
    Update,
    /// Overlapping content: combine into one record.
    Merge,
    /// Related but distinct: store and link.
    AddWithRelation,
}

#[derive(Debug, Clone)]
pub struct DuplicateCheckResult {
    pub duplicate_type: Option<DuplicateType>,
    pub existing: Option<MemoryUnit>,
    pub similarity_score: f32,
    pub recommended_action: DuplicateAction,
}

impl DuplicateCheckResult {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_type.is_some()
    }

    fn not_duplicate() -> Self {
        Self {
            duplicate_type: None,
            existing: None,
            similarity_score: 0.0,
            recommended_action: DuplicateAction::Add,
        }
    }
}

pub struct DuplicateChecker {
    store: Arc<dyn MemoryStore>,
    config: SearchConfig,
}

impl DuplicateChecker {
    pub fn new(store: Arc<dyn MemoryStore>, config: SearchConfig) -> Self {
        Self { store, config }
    }

    /// Ingest-time decision for `content` with its already-computed
    /// embedding. Exact hashing runs over a bounded window of the
    /// tenant's most recently updated records; the semantic pass is a
    /// dense search against the full slice.
    pub async fn check(
        &self,
        tenant_id: &str,
        content: &str,
        embedding: &[f32],
        cancel: &CancellationToken,
    ) -> Result<DuplicateCheckResult> {
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let hash = content_hash(content);
        let window = MemoryFilter {
            limit: Some(self.config.dedup_scan_window),
            ..Default::default()
        };
        let recent = self.store.get_all(tenant_id, &window, cancel).await?;
        for unit in &recent {
            if unit.content_hash() == Some(hash.as_str()) {
                debug!("exact duplicate of {} for tenant {tenant_id}", unit.id);
                return Ok(DuplicateCheckResult {
                    duplicate_type: Some(DuplicateType::Exact),
                    existing: Some(unit.clone()),
                    similarity_score: 1.0,
                    recommended_action: DuplicateAction::Skip,
                });
            }
        }

        let threshold = self.config.duplicate_threshold;
        let opts = SearchOptions {
            filter: MemoryFilter::default(),
            min_score: 0.9 * threshold,
            limit: 5,
        };
        let hits = self
            .store
            .search(tenant_id, embedding, &opts, cancel)
            .await?;
        let Some((existing, score)) = hits.into_iter().next() else {
            return Ok(DuplicateCheckResult::not_duplicate());
        };
        if score < threshold {
            return Ok(DuplicateCheckResult::not_duplicate());
        }

        let action = recommend_action(score, threshold, content.len(), existing.content.len());
        debug!(
            "semantic duplicate of {} (score {score:.3}) → {action:?}",
            existing.id
        );
        Ok(DuplicateCheckResult {
            duplicate_type: Some(DuplicateType::Semantic),
            existing: Some(existing),
            similarity_score: score,
            recommended_action: action,
        })
    }
}

/// Similarity bands, highest first. The AddWithRelation band
/// [threshold, 0.85) is empty at the default threshold and opens up when
/// the threshold is configured lower.
fn recommend_action(
    score: f32,
    threshold: f32,
    new_len: usize,
    existing_len: usize,
) -> DuplicateAction {
    if score >= 0.95 {
        let ratio = if existing_len > 0 {
            new_len as f32 / existing_len as f32
        } else {
            f32::INFINITY
        };
        if ratio > 1.2 {
            DuplicateAction::Update
        } else {
            DuplicateAction::Skip
        }
    } else if score >= 0.85 {
        DuplicateAction::Merge
    } else if score >= threshold {
        DuplicateAction::AddWithRelation
    } else {
        DuplicateAction::Add
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Hash determinism tests
    // ============================================================================

    #[test]
    fn test_hash_ignores_case_whitespace_and_line_endings() {
        let base = content_hash("Hello\r\nWorld");
        assert_eq!(base, content_hash("  hello\nworld  "));
        assert_eq!(base, content_hash("HELLO\rWORLD"));
        assert_eq!(base, content_hash("hello\nworld"));
    }

    #[test]
    fn test_hash_distinguishes_different_content() {
        assert_ne!(content_hash("alpha"), content_hash("beta"));
    }

    #[test]
    fn test_hash_preserves_interior_whitespace() {
        assert_ne!(content_hash("a b"), content_hash("a  b"));
    }

    // ============================================================================
    // Action band tests
    // ============================================================================

    #[test]
    fn test_very_high_similarity_short_content_skips() {
        assert_eq!(
            recommend_action(0.97, 0.85, 100, 100),
            DuplicateAction::Skip
        );
    }

    #[test]
    fn test_very_high_similarity_longer_content_updates() {
        assert_eq!(
            recommend_action(0.97, 0.85, 130, 100),
            DuplicateAction::Update
        );
    }

    #[test]
    fn test_mid_band_merges() {
        assert_eq!(recommend_action(0.90, 0.85, 50, 50), DuplicateAction::Merge);
    }

    #[test]
    fn test_low_band_adds_with_relation_when_threshold_lowered() {
        assert_eq!(
            recommend_action(0.80, 0.75, 50, 50),
            DuplicateAction::AddWithRelation
        );
    }

    #[test]
    fn test_below_threshold_is_add() {
        assert_eq!(recommend_action(0.70, 0.75, 50, 50), DuplicateAction::Add);
    }
}
