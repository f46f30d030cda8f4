// src/service/context.rs
//! Recall-context assembly: the prompt-ready view of a session's memory.
//!
//! Combines the most recent session records, semantically recalled
//! long-term memories, and the working-memory summary tail into one
//! structure a caller can drop into an agent prompt.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::MemoryService;
use crate::core::types::{MemoryFilter, MemoryUnit};
use crate::error::Result;
use crate::search::RetrieveOptions;

/// Tunables for context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    pub tenant_id: String,
    pub session_id: String,
    /// Query driving the semantic slice. Empty means recent-only.
    pub query: String,
    pub recent_count: usize,
    pub semantic_count: usize,
}

impl ContextRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            query: query.into(),
            recent_count: 10,
            semantic_count: 20,
        }
    }
}

/// Assembled context: recent session turns, semantic long-term recall,
/// and the session's rolling summaries.
#[derive(Debug, Clone, Default)]
pub struct RecallContext {
    pub recent: Vec<MemoryUnit>,
    pub semantic: Vec<MemoryUnit>,
    pub recent_summaries: Vec<String>,
}

impl RecallContext {
    /// Render the context as a prompt block: summaries first, then the
    /// semantic slice, then the recent turns in chronological order.
    pub fn as_prompt_block(&self) -> String {
        let mut out = String::new();
        if !self.recent_summaries.is_empty() {
            out.push_str("## Earlier in this conversation\n");
            for summary in &self.recent_summaries {
                out.push_str(summary);
                out.push_str("\n\n");
            }
        }
        if !self.semantic.is_empty() {
            out.push_str("## Relevant memories\n");
            for unit in &self.semantic {
                out.push_str("- ");
                out.push_str(&unit.content);
                out.push('\n');
            }
            out.push('\n');
        }
        if !self.recent.is_empty() {
            out.push_str("## Recent turns\n");
            for unit in self.recent.iter().rev() {
                out.push_str(&unit.content);
                out.push_str("\n\n");
            }
        }
        out.trim_end().to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.semantic.is_empty() && self.recent_summaries.is_empty()
    }
}

impl MemoryService {
    /// Assemble a recall context for one session. The recent slice is a
    /// plain newest-first scan of the session; the semantic slice is a
    /// hybrid retrieval over the whole tenant with session records
    /// deduplicated out.
    pub async fn build_context(
        &self,
        req: &ContextRequest,
        cancel: &CancellationToken,
    ) -> Result<RecallContext> {
        let recent_filter = MemoryFilter {
            session_id: Some(req.session_id.clone()),
            limit: Some(req.recent_count),
            ..Default::default()
        };
        let recent = self
            .memory_store()
            .get_all(&req.tenant_id, &recent_filter, cancel)
            .await?;

        let semantic = if req.query.trim().is_empty() || req.semantic_count == 0 {
            vec![]
        } else {
            let scored = self
                .retriever()
                .retrieve(
                    &req.tenant_id,
                    &req.query,
                    &RetrieveOptions {
                        limit: Some(req.semantic_count),
                        ..Default::default()
                    },
                    cancel,
                )
                .await?;
            scored
                .into_iter()
                .map(|s| s.memory)
                .filter(|m| !recent.iter().any(|r| r.id == m.id))
                .collect()
        };

        let recent_summaries = self
            .working_memory()
            .recent_summaries(&req.tenant_id, &req.session_id)
            .await;

        debug!(
            "context for {}/{}: {} recent, {} semantic, {} summaries",
            req.tenant_id,
            req.session_id,
            recent.len(),
            semantic.len(),
            recent_summaries.len()
        );
        Ok(RecallContext {
            recent,
            semantic,
            recent_summaries,
        })
    }
}
