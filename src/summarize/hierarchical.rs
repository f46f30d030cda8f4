// src/summarize/hierarchical.rs
// Multi-level rollup built on the extractive core

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::extractive::{ExtractiveSummarizer, SourceDoc, Summary};
use crate::core::types::MemoryUnit;
use crate::error::{MemoryError, Result};

/// Layered summaries, bottom-up. `levels[0]` summarizes groups of source
/// memories, each higher level summarizes the one below, and `root`
/// condenses the final layer into a single summary.
#[derive(Debug, Clone)]
pub struct HierarchicalSummary {
    pub levels: Vec<Vec<Summary>>,
    pub root: Summary,
}

impl ExtractiveSummarizer {
    /// Roll the memories up through `levels` layers (clamped to [2, 5]).
    /// Each layer chunks its input into roughly equal groups of at least
    /// three items and summarizes each group.
    pub async fn summarize_hierarchical(
        &self,
        memories: &[MemoryUnit],
        levels: usize,
        cancel: &CancellationToken,
    ) -> Result<HierarchicalSummary> {
        if memories.is_empty() {
            return Err(MemoryError::BadRequest(
                "nothing to summarize hierarchically".into(),
            ));
        }
        let levels = levels.clamp(2, 5);

        let mut current: Vec<SourceDoc> = memories
            .iter()
            .map(|m| SourceDoc {
                text: m.content.clone(),
                importance: m.importance,
            })
            .collect();
        let mut layers: Vec<Vec<Summary>> = Vec::new();

        for level in 0..levels - 1 {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            if current.len() <= 1 {
                break;
            }
            let mut layer = Vec::new();
            for group in chunk_groups(&current) {
                layer.push(self.summarize_docs(group, cancel).await?);
            }
            debug!(
                "hierarchical level {level}: {} items → {} summaries",
                current.len(),
                layer.len()
            );
            current = layer
                .iter()
                .map(|s| SourceDoc {
                    text: s.content.clone(),
                    importance: 0.5,
                })
                .collect();
            layers.push(layer);
        }

        let root = self.summarize_docs(&current, cancel).await?;
        Ok(HierarchicalSummary { levels: layers, root })
    }
}

/// Split into roughly equal groups of at least three items. A short tail
/// is folded into the previous group rather than emitted undersized.
fn chunk_groups(items: &[SourceDoc]) -> Vec<&[SourceDoc]> {
    const MIN_GROUP: usize = 3;
    if items.len() <= MIN_GROUP {
        return vec![items];
    }
    let group_count = (items.len() / MIN_GROUP).max(1);
    let base = items.len() / group_count;
    let mut out = Vec::with_capacity(group_count);
    let mut start = 0;
    for g in 0..group_count {
        let end = if g == group_count - 1 {
            items.len()
        } else {
            start + base
        };
        out.push(&items[start..end]);
        start = end;
    }
    out
}
