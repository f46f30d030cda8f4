// src/dedup/merge.rs
//! Batch group discovery and policy-driven merging.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::content_hash;
use crate::core::traits::MemoryStore;
use crate::core::types::{MemoryFilter, MemoryUnit};
use crate::embeddings::dot;
use crate::error::{MemoryError, Result};
use crate::lineage::LineageTracker;
use crate::search::Bm25Index;

/// Which member of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    KeepOldest,
    KeepNewest,
    KeepMostAccessed,
    KeepHighestImportance,
    /// Keep the oldest and append unique sentences from the others.
    CombineContent,
}

/// A set of mutually similar records. Members are ordered by
/// `created_at` ascending then importance descending; the head is the
/// default primary.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub members: Vec<MemoryUnit>,
}

impl DuplicateGroup {
    pub fn primary(&self) -> &MemoryUnit {
        &self.members[0]
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub groups_merged: usize,
    pub memories_removed: usize,
}

pub struct MergeEngine {
    store: Arc<dyn MemoryStore>,
    sparse: Arc<Bm25Index>,
    lineage: Arc<LineageTracker>,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        sparse: Arc<Bm25Index>,
        lineage: Arc<LineageTracker>,
    ) -> Self {
        Self {
            store,
            sparse,
            lineage,
        }
    }

    /// Pairwise-similarity grouping over the tenant's embedded records.
    /// Greedy closure: each unprocessed record seeds a group of everything
    /// at or above `threshold`; singleton groups are discarded.
    pub async fn find_groups(
        &self,
        tenant_id: &str,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<Vec<DuplicateGroup>> {
        let all = self
            .store
            .get_all(tenant_id, &MemoryFilter::default(), cancel)
            .await?;
        let candidates: Vec<MemoryUnit> =
            all.into_iter().filter(|u| u.has_embedding()).collect();

        let mut processed = vec![false; candidates.len()];
        let mut groups = Vec::new();
        for i in 0..candidates.len() {
            if processed[i] {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            processed[i] = true;
            let seed = candidates[i].embedding.as_deref().unwrap_or(&[]);
            let mut members = vec![candidates[i].clone()];
            for j in (i + 1)..candidates.len() {
                if processed[j] {
                    continue;
                }
                let other = candidates[j].embedding.as_deref().unwrap_or(&[]);
                if dot(seed, other) >= threshold {
                    processed[j] = true;
                    members.push(candidates[j].clone());
                }
            }
            if members.len() < 2 {
                continue;
            }
            members.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| {
                    b.importance
                        .partial_cmp(&a.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });
            groups.push(DuplicateGroup { members });
        }
        debug!(
            "found {} duplicate groups for tenant {tenant_id}",
            groups.len()
        );
        Ok(groups)
    }

    /// Collapse one group. The surviving record absorbs the group's
    /// access counts, the maximum importance, and the union of topics;
    /// the rest are hard-deleted and a Merged lineage event is emitted.
    pub async fn merge_group(
        &self,
        group: &DuplicateGroup,
        strategy: MergeStrategy,
        cancel: &CancellationToken,
    ) -> Result<MemoryUnit> {
        if group.members.len() < 2 {
            return Err(MemoryError::BadRequest(
                "merge group needs at least two members".into(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let mut primary = select_primary(&group.members, strategy).clone();
        let duplicates: Vec<MemoryUnit> = group
            .members
            .iter()
            .filter(|m| m.id != primary.id)
            .cloned()
            .collect();

        if strategy == MergeStrategy::CombineContent {
            primary.content = combine_content(&primary.content, &duplicates);
            primary
                .metadata
                .insert("content_hash".to_string(), content_hash(&primary.content));
        }

        primary.access_count = group.members.iter().map(|m| m.access_count).sum();
        primary.importance = group
            .members
            .iter()
            .map(|m| m.importance)
            .fold(0.0, f32::max);
        for member in &duplicates {
            primary.topics.extend(member.topics.iter().cloned());
        }

        if !self.store.update(&primary).await? {
            return Err(MemoryError::NotFound(format!(
                "merge primary {} disappeared",
                primary.id
            )));
        }
        if strategy == MergeStrategy::CombineContent {
            self.sparse
                .add(&primary.tenant_id, primary.id, &primary.content);
        }

        let mut removed: Vec<Uuid> = Vec::new();
        for member in &duplicates {
            self.store
                .delete(&primary.tenant_id, member.id, true)
                .await?;
            self.sparse.remove(&primary.tenant_id, member.id);
            self.lineage.purge(member.id);
            removed.push(member.id);
        }
        self.lineage.record_merged(&primary, &removed);

        info!(
            "merged {} duplicates into {} for tenant {}",
            removed.len(),
            primary.id,
            primary.tenant_id
        );
        Ok(primary)
    }

    /// Discover and merge every group in one pass.
    pub async fn merge_duplicates(
        &self,
        tenant_id: &str,
        threshold: f32,
        strategy: MergeStrategy,
        cancel: &CancellationToken,
    ) -> Result<MergeReport> {
        let groups = self.find_groups(tenant_id, threshold, cancel).await?;
        let mut report = MergeReport::default();
        for group in &groups {
            let merged = self.merge_group(group, strategy, cancel).await?;
            report.groups_merged += 1;
            report.memories_removed += group.members.len() - 1;
            debug!("group collapsed into {}", merged.id);
        }
        Ok(report)
    }
}

fn select_primary(members: &[MemoryUnit], strategy: MergeStrategy) -> &MemoryUnit {
    match strategy {
        // Members arrive ordered created-asc / importance-desc.
        MergeStrategy::KeepOldest | MergeStrategy::CombineContent => &members[0],
        MergeStrategy::KeepNewest => members
            .iter()
            .max_by_key(|m| m.created_at)
            .unwrap_or(&members[0]),
        MergeStrategy::KeepMostAccessed => members
            .iter()
            .max_by_key(|m| m.access_count)
            .unwrap_or(&members[0]),
        MergeStrategy::KeepHighestImportance => members
            .iter()
            .max_by(|a, b| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(&members[0]),
    }
}

/// Append sentences from `duplicates` that the primary does not already
/// contain.
fn combine_content(primary: &str, duplicates: &[MemoryUnit]) -> String {
    let additions: Vec<&str> = duplicates.iter().map(|m| m.content.as_str()).collect();
    combine_texts(primary, &additions)
}

/// Sentence-deduplicated concatenation. Sentences split on `.!?`;
/// comparison is case-folded and trimmed.
pub(crate) fn combine_texts(primary: &str, additions: &[&str]) -> String {
    let mut seen: Vec<String> = split_sentences(primary)
        .iter()
        .map(|s| s.trim().to_lowercase())
        .collect();
    let mut combined = primary.trim_end().to_string();
    for addition in additions {
        for sentence in split_sentences(addition) {
            let key = sentence.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if !combined.is_empty() {
                combined.push(' ');
            }
            combined.push_str(sentence.trim());
            combined.push('.');
        }
    }
    combined
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
