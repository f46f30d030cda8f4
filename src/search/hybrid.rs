// src/search/hybrid.rs
//! Hybrid retrieval: dense + sparse fusion by reciprocal rank.
//!
//! Purely functional over index snapshots — no locks held across the
//! dense and sparse branches, so a sparse hit whose record has not
//! finished landing in the dense index is simply omitted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::bm25::Bm25Index;
use super::expansion::QueryExpander;
use super::scoring::CompositeScorer;
use crate::config::{ScoringConfig, SearchConfig};
use crate::core::traits::MemoryStore;
use crate::core::types::{sort_by_score, MemoryFilter, MemoryUnit, ScoredMemory, SearchOptions};
use crate::embeddings::EmbeddingGateway;
use crate::error::{MemoryError, Result};

/// Per-call knobs. Everything omitted falls back to the retriever config.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub limit: Option<usize>,
    pub filter: MemoryFilter,
    pub dense_weight: Option<f32>,
    pub sparse_weight: Option<f32>,
    pub rrf_k: Option<f32>,
}

pub struct HybridRetriever {
    store: Arc<dyn MemoryStore>,
    sparse: Arc<Bm25Index>,
    gateway: Arc<EmbeddingGateway>,
    expander: QueryExpander,
    scorer: CompositeScorer,
    config: SearchConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        sparse: Arc<Bm25Index>,
        gateway: Arc<EmbeddingGateway>,
        search_config: SearchConfig,
        scoring_config: ScoringConfig,
    ) -> Self {
        Self {
            store,
            sparse,
            gateway,
            expander: QueryExpander::new(search_config.expansion_variants),
            scorer: CompositeScorer::new(scoring_config),
            config: search_config,
        }
    }

    /// Expand, retrieve both ways, fuse by RRF, rescore, return the top
    /// `limit` in deterministic order.
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query: &str,
        opts: &RetrieveOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredMemory>> {
        if tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        if query.trim().is_empty() {
            return Err(MemoryError::BadRequest("query must not be empty".into()));
        }

        let limit = opts.limit.unwrap_or(self.config.default_limit).max(1);
        let fetch = limit * 2;
        let expansion = self.expander.expand(query);
        debug!(
            "hybrid retrieve for tenant {tenant_id}: {} dense variants",
            expansion.variants.len()
        );

        // Dense branch: every variant searched concurrently, best score
        // per id kept.
        let vectors = self
            .gateway
            .embed_batch(&expansion.variants, cancel)
            .await?;
        let search_opts = SearchOptions {
            filter: opts.filter.clone(),
            min_score: 0.0,
            limit: fetch,
        };
        let searches: Vec<_> = vectors
            .iter()
            .map(|vector| self.store.search(tenant_id, vector, &search_opts, cancel))
            .collect();
        let mut dense_best: HashMap<Uuid, (MemoryUnit, f32)> = HashMap::new();
        for outcome in futures::future::join_all(searches).await {
            for (unit, score) in outcome? {
                dense_best
                    .entry(unit.id)
                    .and_modify(|slot| {
                        if score > slot.1 {
                            slot.1 = score;
                        }
                    })
                    .or_insert((unit, score));
            }
        }
        let mut dense_ranked: Vec<(MemoryUnit, f32)> = dense_best.into_values().collect();
        sort_by_score(&mut dense_ranked);
        dense_ranked.truncate(fetch);

        // Sparse branch over the synonym-widened query.
        let sparse_ranked = self.sparse.search(tenant_id, &expansion.sparse_query, fetch);

        // Reciprocal-rank fusion (ranks are 1-based; absence contributes 0).
        let dense_weight = opts.dense_weight.unwrap_or(self.config.dense_weight);
        let sparse_weight = opts.sparse_weight.unwrap_or(self.config.sparse_weight);
        let rrf_k = opts.rrf_k.unwrap_or(self.config.rrf_k);
        let mut rrf: HashMap<Uuid, f32> = HashMap::new();
        for (rank, (unit, _)) in dense_ranked.iter().enumerate() {
            *rrf.entry(unit.id).or_insert(0.0) += dense_weight / (rrf_k + (rank + 1) as f32);
        }
        for (rank, (id, _)) in sparse_ranked.iter().enumerate() {
            *rrf.entry(*id).or_insert(0.0) += sparse_weight / (rrf_k + (rank + 1) as f32);
        }

        // Materialize records: dense hits carry theirs, sparse-only ids go
        // back to the index. Missing or filtered-out records drop out.
        let mut records: HashMap<Uuid, MemoryUnit> = dense_ranked
            .into_iter()
            .map(|(unit, _)| (unit.id, unit))
            .collect();
        for (id, _) in &sparse_ranked {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            if records.contains_key(id) {
                continue;
            }
            if let Some(unit) = self.store.get(tenant_id, *id).await? {
                if opts.filter.matches(&unit) {
                    records.insert(*id, unit);
                }
            }
        }

        let fused: Vec<(MemoryUnit, f32)> = records
            .into_values()
            .map(|unit| {
                let score = rrf.get(&unit.id).copied().unwrap_or(0.0);
                (unit, score)
            })
            .collect();

        let mut scored = self.scorer.rescore(fused, Utc::now());
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embeddings::HashedEmbedder;
    use crate::storage::InMemoryStore;

    const DIMS: usize = 128;

    async fn fixture() -> (HybridRetriever, Arc<dyn MemoryStore>, Arc<Bm25Index>) {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new(DIMS));
        let sparse = Arc::new(Bm25Index::default());
        let gateway = Arc::new(EmbeddingGateway::new(
            Arc::new(HashedEmbedder::new(DIMS)),
            EmbeddingConfig {
                dimensions: DIMS,
                ..Default::default()
            },
        ));
        let retriever = HybridRetriever::new(
            store.clone(),
            sparse.clone(),
            gateway.clone(),
            SearchConfig::default(),
            ScoringConfig::default(),
        );
        (retriever, store, sparse)
    }

    async fn seed(
        store: &Arc<dyn MemoryStore>,
        sparse: &Arc<Bm25Index>,
        tenant: &str,
        content: &str,
    ) -> Uuid {
        let gateway = EmbeddingGateway::new(
            Arc::new(HashedEmbedder::new(DIMS)),
            EmbeddingConfig {
                dimensions: DIMS,
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        let mut unit = MemoryUnit::new(tenant, content);
        unit.embedding = Some(gateway.embed(content, &cancel).await.unwrap());
        let saved = store.store(unit).await.unwrap();
        sparse.add(tenant, saved.id, content);
        saved.id
    }

    #[tokio::test]
    async fn test_topical_records_rank_above_unrelated() {
        let (retriever, store, sparse) = fixture().await;
        for content in [
            "battery optimization saves phone power",
            "reduce battery drain by dimming the screen",
            "battery care extends device life",
        ] {
            seed(&store, &sparse, "t", content).await;
        }
        for content in [
            "pasta carbonara with cream",
            "bake bread at high temperature",
            "soup recipe with lentils",
        ] {
            seed(&store, &sparse, "t", content).await;
        }

        let hits = retriever
            .retrieve(
                "t",
                "how to save battery",
                &RetrieveOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert!(
            hits[0].memory.content.contains("battery"),
            "top hit should be on topic, got '{}'",
            hits[0].memory.content
        );
    }

    #[tokio::test]
    async fn test_sparse_only_orphan_is_omitted() {
        let (retriever, store, sparse) = fixture().await;
        seed(&store, &sparse, "t", "battery saving guide").await;
        // Sparse entry with no backing record: the transient window where
        // BM25 leads the dense index.
        sparse.add("t", Uuid::new_v4(), "battery phantom entry");

        let hits = retriever
            .retrieve(
                "t",
                "battery",
                &RetrieveOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.content, "battery saving guide");
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let (retriever, _, _) = fixture().await;
        let err = retriever
            .retrieve(
                "t",
                "   ",
                &RetrieveOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn test_limit_bounds_results() {
        let (retriever, store, sparse) = fixture().await;
        for n in 0..8 {
            seed(&store, &sparse, "t", &format!("battery note number {n}")).await;
        }
        let hits = retriever
            .retrieve(
                "t",
                "battery note",
                &RetrieveOptions {
                    limit: Some(3),
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_seed_order_does_not_change_ranking() {
        // Same corpus, opposite insertion orders: the fused ranking must
        // agree because scores, not arrival order, decide it.
        let corpus = [
            "battery saver battery guide battery tips",
            "battery saver settings overview",
            "general battery information",
            "cooking with cast iron pans",
        ];
        let mut rankings = Vec::new();
        for reversed in [false, true] {
            let (retriever, store, sparse) = fixture().await;
            let mut docs: Vec<&str> = corpus.to_vec();
            if reversed {
                docs.reverse();
            }
            for content in docs {
                seed(&store, &sparse, "t", content).await;
            }
            let hits = retriever
                .retrieve(
                    "t",
                    "battery saver",
                    &RetrieveOptions::default(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            rankings.push(
                hits.into_iter()
                    .map(|s| s.memory.content)
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(rankings[0], rankings[1]);
    }

    #[tokio::test]
    async fn test_per_call_weights_override_config() {
        let (retriever, store, sparse) = fixture().await;
        seed(&store, &sparse, "t", "battery report").await;

        let weighted = retriever
            .retrieve(
                "t",
                "battery",
                &RetrieveOptions {
                    dense_weight: Some(1.0),
                    sparse_weight: Some(0.0),
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(weighted.len(), 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_sparse_hit_is_filtered() {
        let (retriever, store, sparse) = fixture().await;
        let id = seed(&store, &sparse, "t", "battery trivia").await;
        store.delete("t", id, false).await.unwrap();

        let hits = retriever
            .retrieve(
                "t",
                "battery trivia",
                &RetrieveOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
