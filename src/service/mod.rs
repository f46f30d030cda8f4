// src/service/mod.rs

//! The service facade: wires admission control, security filtering,
//! embedding, dedup, indexing, and lineage into the ingest and recall
//! pipelines, and exposes the operation surface callers see.
//!
//! Write ordering on ingest: memory record first, then the sparse index,
//! then lineage. Retrieval tolerates the transient window where the
//! sparse index leads the record.

mod context;
mod types;

pub use context::{ContextRequest, RecallContext};
pub use types::*;

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compress::Compressor;
use crate::config::ServiceConfig;
use crate::core::traits::MemoryStore;
use crate::core::types::{MemoryFilter, MemoryUnit};
use crate::dedup::{
    content_hash, DuplicateAction, DuplicateChecker, DuplicateCheckResult, DuplicateType,
    MergeEngine, MergeReport, MergeStrategy,
};
use crate::embeddings::EmbeddingGateway;
use crate::error::{MemoryError, Result};
use crate::graph::{self, Entity, GraphStats, KnowledgeGraph, Relation};
use crate::lineage::{LineageQuery, LineageTracker, MemoryRelation, RelationKind};
use crate::rate_limit::{Operation, RateLimitDecision, RateLimiter};
use crate::search::{Bm25Index, HybridRetriever, RetrieveOptions};
use crate::security::{
    InjectionDetector, PiiDetector, RedactionMode, SanitizeOptions,
};
use crate::session::SessionManager;
use crate::storage::InMemoryStore;
use crate::summarize::ExtractiveSummarizer;
use crate::working_memory::WorkingMemoryManager;

pub struct MemoryService {
    config: ServiceConfig,
    store: Arc<dyn MemoryStore>,
    sparse: Arc<Bm25Index>,
    gateway: Arc<EmbeddingGateway>,
    retriever: HybridRetriever,
    dedup: DuplicateChecker,
    merge: MergeEngine,
    summarizer: Arc<ExtractiveSummarizer>,
    compressor: Compressor,
    working_memory: WorkingMemoryManager,
    pii: PiiDetector,
    injection: InjectionDetector,
    limiter: RateLimiter,
    lineage: Arc<LineageTracker>,
    graph: KnowledgeGraph,
    sessions: SessionManager,
}

impl MemoryService {
    /// Service over the reference in-memory index and the configured
    /// embedding provider.
    pub fn new(config: ServiceConfig) -> Self {
        let store: Arc<dyn MemoryStore> =
            Arc::new(InMemoryStore::new(config.embedding.dimensions));
        let gateway = Arc::new(EmbeddingGateway::from_config(config.embedding.clone()));
        Self::with_backend(config, store, gateway)
    }

    /// Service over a caller-provided backend and gateway. The backend
    /// must preserve the tenant pre-filter invariant.
    pub fn with_backend(
        config: ServiceConfig,
        store: Arc<dyn MemoryStore>,
        gateway: Arc<EmbeddingGateway>,
    ) -> Self {
        let sparse = Arc::new(Bm25Index::default());
        let lineage = Arc::new(LineageTracker::new());
        let summarizer = Arc::new(ExtractiveSummarizer::new(
            gateway.clone(),
            config.summary.clone(),
        ));
        let retriever = HybridRetriever::new(
            store.clone(),
            sparse.clone(),
            gateway.clone(),
            config.search.clone(),
            config.scoring.clone(),
        );
        let dedup = DuplicateChecker::new(store.clone(), config.search.clone());
        let merge = MergeEngine::new(store.clone(), sparse.clone(), lineage.clone());
        let working_memory = WorkingMemoryManager::new(
            store.clone(),
            gateway.clone(),
            summarizer.clone(),
            config.working_memory.clone(),
        );
        let limiter = RateLimiter::new(config.rate_limit.clone());

        Self {
            store,
            sparse,
            gateway,
            retriever,
            dedup,
            merge,
            summarizer,
            compressor: Compressor::new(),
            working_memory,
            pii: PiiDetector::new(),
            injection: InjectionDetector::new(),
            limiter,
            lineage,
            graph: KnowledgeGraph::new(),
            sessions: SessionManager::new(),
            config,
        }
    }

    // ── Core operations ───────────────────────────────────────────────────────

    /// Ingest one memory: admit → security screen → embed → dedup →
    /// index → lineage.
    pub async fn store(&self, req: StoreRequest, cancel: &CancellationToken) -> StoreOutcome {
        if let Err(err) = self.admit(&req.tenant_id, Operation::Store) {
            return StoreOutcome::from_error(&err);
        }
        match self.store_inner(req, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("store failed: {err}");
                StoreOutcome::from_error(&err)
            }
        }
    }

    async fn store_inner(
        &self,
        req: StoreRequest,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        if req.tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        if req.content.trim().is_empty() {
            return Err(MemoryError::BadRequest("content must not be empty".into()));
        }

        // Security screen before anything is embedded or persisted.
        let analysis = self.injection.analyze(&req.content);
        if analysis.risk_score >= self.config.security.block_risk_threshold {
            return Err(MemoryError::BadRequest(format!(
                "content rejected: injection risk {:.2} ({:?})",
                analysis.risk_score, analysis.risk_level
            )));
        }
        let content = if self.config.security.redact_before_store {
            self.pii
                .redact(&req.content, &RedactionMode::Replace { include_type: true })
                .redacted
        } else {
            req.content.clone()
        };

        let embedding = self.gateway.embed(&content, cancel).await?;
        let check = self
            .dedup
            .check(&req.tenant_id, &content, &embedding, cancel)
            .await?;

        if let Some(session_id) = &req.session_id {
            self.sessions
                .record_message(&req.tenant_id, session_id)
                .await;
        }

        match check.recommended_action {
            DuplicateAction::Skip => {
                let existing = duplicate_target(&check)?;
                debug!(
                    "skipping duplicate of {} for tenant {}",
                    existing.id, req.tenant_id
                );
                Ok(self.duplicate_outcome(existing.id, &check))
            }
            DuplicateAction::Update => {
                let mut existing = duplicate_target(&check)?.clone();
                let previous_hash = existing.content_hash().map(str::to_string);
                existing.content = content.clone();
                existing.embedding = Some(embedding);
                let new_hash = content_hash(&content);
                existing
                    .metadata
                    .insert("content_hash".to_string(), new_hash.clone());
                self.store.update(&existing).await?;
                self.sparse
                    .add(&req.tenant_id, existing.id, &existing.content);
                self.lineage
                    .record_updated(&existing, previous_hash, Some(new_hash));
                Ok(self.duplicate_outcome(existing.id, &check))
            }
            DuplicateAction::Merge => {
                let mut existing = duplicate_target(&check)?.clone();
                let previous_hash = existing.content_hash().map(str::to_string);
                existing.content =
                    crate::dedup::combine_texts(&existing.content, &[content.as_str()]);
                let new_hash = content_hash(&existing.content);
                existing
                    .metadata
                    .insert("content_hash".to_string(), new_hash.clone());
                existing.embedding =
                    Some(self.gateway.embed(&existing.content, cancel).await?);
                self.store.update(&existing).await?;
                self.sparse
                    .add(&req.tenant_id, existing.id, &existing.content);
                self.lineage
                    .record_updated(&existing, previous_hash, Some(new_hash));
                Ok(self.duplicate_outcome(existing.id, &check))
            }
            DuplicateAction::AddWithRelation => {
                let related_to = duplicate_target(&check)?.id;
                let saved = self.insert_new(&req, content, embedding).await?;
                self.lineage.record_relation(MemoryRelation {
                    from: saved.id,
                    to: related_to,
                    kind: RelationKind::RelatedTo,
                    tenant_id: saved.tenant_id.clone(),
                    created_at: Utc::now(),
                });
                Ok(StoreOutcome {
                    success: true,
                    id: Some(saved.id),
                    duplicate: Some(duplicate_report(&check)),
                    ..Default::default()
                })
            }
            DuplicateAction::Add => {
                let saved = self.insert_new(&req, content, embedding).await?;
                Ok(StoreOutcome {
                    success: true,
                    id: Some(saved.id),
                    ..Default::default()
                })
            }
        }
    }

    async fn insert_new(
        &self,
        req: &StoreRequest,
        content: String,
        embedding: Vec<f32>,
    ) -> Result<MemoryUnit> {
        let hash = content_hash(&content);
        let mut unit = MemoryUnit::new(&req.tenant_id, content)
            .with_type(req.memory_type.unwrap_or_default())
            .with_importance(req.importance.unwrap_or(0.5))
            .with_topics(req.topics.clone());
        if let Some(session_id) = &req.session_id {
            unit.session_id = Some(session_id.clone());
        }
        unit.embedding = Some(embedding);
        unit.metadata.insert("content_hash".to_string(), hash);

        // Record, then sparse index, then lineage (§ write ordering).
        let saved = self.store.store(unit).await?;
        self.sparse.add(&saved.tenant_id, saved.id, &saved.content);
        self.lineage.record_created(&saved);
        info!("stored memory {} for tenant {}", saved.id, saved.tenant_id);
        Ok(saved)
    }

    fn duplicate_outcome(&self, id: Uuid, check: &DuplicateCheckResult) -> StoreOutcome {
        StoreOutcome {
            success: true,
            id: Some(id),
            duplicate: Some(duplicate_report(check)),
            ..Default::default()
        }
    }

    /// Hybrid recall with access bookkeeping on every returned memory.
    pub async fn recall(&self, req: RecallRequest, cancel: &CancellationToken) -> RecallOutcome {
        if let Err(err) = self.admit(&req.tenant_id, Operation::Recall) {
            return RecallOutcome::from_error(&err);
        }
        match self.recall_inner(req, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("recall failed: {err}");
                RecallOutcome::from_error(&err)
            }
        }
    }

    async fn recall_inner(
        &self,
        req: RecallRequest,
        cancel: &CancellationToken,
    ) -> Result<RecallOutcome> {
        let opts = RetrieveOptions {
            limit: req.limit,
            filter: MemoryFilter {
                session_id: req.session_id.clone(),
                types: req.memory_type.map(|t| vec![t]),
                ..Default::default()
            },
            ..Default::default()
        };
        let scored = self
            .retriever
            .retrieve(&req.tenant_id, &req.query, &opts, cancel)
            .await?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(scored.len());
        for hit in scored {
            let mut unit = hit.memory;
            unit.mark_accessed(now);
            self.store.update(&unit).await?;
            self.lineage.record_accessed(&req.tenant_id, unit.id);
            items.push(RecallItem {
                id: unit.id,
                content: unit.content,
                memory_type: unit.memory_type,
                score: hit.score,
                importance: unit.importance,
                created_at: unit.created_at,
                access_count: unit.access_count,
            });
        }

        Ok(RecallOutcome {
            success: true,
            items,
            ..Default::default()
        })
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> GetOutcome {
        match self.store.get(tenant_id, id).await {
            Ok(Some(memory)) => GetOutcome {
                success: true,
                memory: Some(memory),
                ..Default::default()
            },
            Ok(None) => GetOutcome::from_error(&MemoryError::NotFound(format!(
                "memory {id} not found for tenant {tenant_id}"
            ))),
            Err(err) => GetOutcome::from_error(&err),
        }
    }

    pub async fn get_all(
        &self,
        tenant_id: &str,
        filter: MemoryFilter,
        cancel: &CancellationToken,
    ) -> ListOutcome {
        let total = match self.store.count(tenant_id).await {
            Ok(total) => total,
            Err(err) => return ListOutcome::from_error(&err),
        };
        match self.store.get_all(tenant_id, &filter, cancel).await {
            Ok(items) => ListOutcome {
                success: true,
                total,
                returned: items.len(),
                items,
                ..Default::default()
            },
            Err(err) => ListOutcome::from_error(&err),
        }
    }

    /// Patch content and/or importance. Content changes re-embed,
    /// re-index, and land an Updated lineage event.
    pub async fn update(
        &self,
        tenant_id: &str,
        id: Uuid,
        content: Option<String>,
        importance: Option<f32>,
        cancel: &CancellationToken,
    ) -> OpOutcome {
        if let Err(err) = self.admit(tenant_id, Operation::Update) {
            return OpOutcome::from_error(&err);
        }
        match self
            .update_inner(tenant_id, id, content, importance, cancel)
            .await
        {
            Ok(()) => OpOutcome {
                success: true,
                ..Default::default()
            },
            Err(err) => OpOutcome::from_error(&err),
        }
    }

    async fn update_inner(
        &self,
        tenant_id: &str,
        id: Uuid,
        content: Option<String>,
        importance: Option<f32>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(mut unit) = self.store.get(tenant_id, id).await? else {
            return Err(MemoryError::NotFound(format!(
                "memory {id} not found for tenant {tenant_id}"
            )));
        };

        let mut content_changed = false;
        if let Some(content) = content {
            if content.trim().is_empty() {
                return Err(MemoryError::BadRequest("content must not be empty".into()));
            }
            content_changed = unit.content != content;
            unit.content = content;
        }
        if let Some(importance) = importance {
            if !(0.0..=1.0).contains(&importance) {
                return Err(MemoryError::BadRequest(format!(
                    "importance {importance} outside [0, 1]"
                )));
            }
            unit.importance = importance;
        }

        let previous_hash = unit.content_hash().map(str::to_string);
        let mut new_hash = previous_hash.clone();
        if content_changed {
            let hash = content_hash(&unit.content);
            unit.metadata
                .insert("content_hash".to_string(), hash.clone());
            unit.embedding = Some(self.gateway.embed(&unit.content, cancel).await?);
            new_hash = Some(hash);
        }

        if !self.store.update(&unit).await? {
            return Err(MemoryError::NotFound(format!(
                "memory {id} vanished during update"
            )));
        }
        if content_changed {
            self.sparse.add(tenant_id, unit.id, &unit.content);
        }
        self.lineage.record_updated(&unit, previous_hash, new_hash);
        Ok(())
    }

    /// Soft delete flags the record; permanent delete removes it and
    /// purges the sparse index and lineage.
    pub async fn delete(&self, tenant_id: &str, id: Uuid, permanent: bool) -> OpOutcome {
        if let Err(err) = self.admit(tenant_id, Operation::Delete) {
            return OpOutcome::from_error(&err);
        }
        match self.store.delete(tenant_id, id, permanent).await {
            Ok(true) => {
                self.sparse.remove(tenant_id, id);
                if permanent {
                    self.lineage.purge(id);
                } else {
                    self.lineage.record_deleted(tenant_id, id, false);
                }
                OpOutcome {
                    success: true,
                    ..Default::default()
                }
            }
            Ok(false) => OpOutcome::from_error(&MemoryError::NotFound(format!(
                "memory {id} not found for tenant {tenant_id}"
            ))),
            Err(err) => OpOutcome::from_error(&err),
        }
    }

    /// Batch ingest under the Batch admission class. Per-record outcomes;
    /// one record failing does not roll back the others.
    pub async fn store_batch(
        &self,
        tenant_id: &str,
        requests: Vec<StoreRequest>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        if let Err(err) = self.admit(tenant_id, Operation::Batch) {
            return BatchOutcome::from_error(&err);
        }
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            if cancel.is_cancelled() {
                results.push(StoreOutcome::from_error(&MemoryError::Cancelled));
                continue;
            }
            let result = match self.store_inner(req, cancel).await {
                Ok(outcome) => outcome,
                Err(err) => StoreOutcome::from_error(&err),
            };
            results.push(result);
        }
        BatchOutcome {
            success: results.iter().all(|r| r.success),
            results,
            ..Default::default()
        }
    }

    /// Summarize the memories matching `filter` and, when asked, archive
    /// the summary back into the index as a Semantic memory.
    pub async fn summarize(
        &self,
        tenant_id: &str,
        filter: MemoryFilter,
        store_result: bool,
        cancel: &CancellationToken,
    ) -> SummarizeOutcome {
        match self
            .summarize_inner(tenant_id, filter, store_result, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => SummarizeOutcome::from_error(&err),
        }
    }

    async fn summarize_inner(
        &self,
        tenant_id: &str,
        filter: MemoryFilter,
        store_result: bool,
        cancel: &CancellationToken,
    ) -> Result<SummarizeOutcome> {
        let mut sources = self.store.get_all(tenant_id, &filter, cancel).await?;
        if sources.is_empty() {
            return Ok(SummarizeOutcome {
                success: true,
                ..Default::default()
            });
        }
        // get_all returns newest first; summaries read chronologically.
        sources.reverse();

        let summary = self.summarizer.summarize_memories(&sources, cancel).await?;
        let mut summary_id = None;
        if store_result && !summary.content.is_empty() {
            let mut unit = MemoryUnit::new(tenant_id, summary.content.clone())
                .with_type(crate::core::types::MemoryType::Semantic)
                .with_importance(0.7)
                .with_topics(summary.topics.iter().cloned());
            unit.embedding = match summary.embedding.clone() {
                Some(embedding) => Some(embedding),
                None => Some(self.gateway.embed(&summary.content, cancel).await?),
            };
            unit.metadata
                .insert("source".to_string(), "summary".to_string());
            unit.metadata.insert(
                "content_hash".to_string(),
                content_hash(&summary.content),
            );
            let saved = self.store.store(unit).await?;
            self.sparse.add(tenant_id, saved.id, &saved.content);
            self.lineage.record_created(&saved);
            summary_id = Some(saved.id);
        }

        Ok(SummarizeOutcome {
            success: true,
            summary_id,
            content: summary.content,
            key_points: summary.key_points,
            entities: summary.entities,
            token_estimate: summary.token_estimate,
            source_count: sources.len(),
            message: None,
            error_kind: None,
        })
    }

    /// Audit trail for one memory: lineage events plus typed relations.
    /// Tenant scoping is enforced by resolving the id first.
    pub async fn memory_history(
        &self,
        tenant_id: &str,
        id: Uuid,
        query: LineageQuery,
    ) -> HistoryOutcome {
        match self.store.get(tenant_id, id).await {
            Ok(Some(_)) => HistoryOutcome {
                success: true,
                events: self.lineage.events_for(id, &query),
                relations: self.lineage.relations_for(id),
                ..Default::default()
            },
            Ok(None) => HistoryOutcome::from_error(&MemoryError::NotFound(format!(
                "memory {id} not found for tenant {tenant_id}"
            ))),
            Err(err) => HistoryOutcome::from_error(&err),
        }
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Discover duplicate groups across the tenant and collapse each one
    /// under the given strategy.
    pub async fn merge_duplicates(
        &self,
        tenant_id: &str,
        strategy: MergeStrategy,
        cancel: &CancellationToken,
    ) -> Result<MergeReport> {
        self.merge
            .merge_duplicates(
                tenant_id,
                self.config.search.duplicate_threshold,
                strategy,
                cancel,
            )
            .await
    }

    // ── Security surface ──────────────────────────────────────────────────────

    pub fn detect_pii(&self, text: &str) -> PiiOutcome {
        PiiOutcome {
            success: true,
            matches: self.pii.detect(text),
        }
    }

    pub fn redact_pii(&self, text: &str, mode: &RedactionMode) -> RedactOutcome {
        let result = self.pii.redact(text, mode);
        RedactOutcome {
            success: true,
            redacted: result.redacted,
            redactions: result.redactions,
        }
    }

    pub fn detect_injection(&self, text: &str) -> InjectionOutcome {
        let analysis = self.injection.analyze(text);
        InjectionOutcome {
            success: true,
            risk_score: analysis.risk_score,
            risk_level: analysis.risk_level,
            matches: analysis.matches,
        }
    }

    pub fn sanitize_input(&self, text: &str, opts: &SanitizeOptions) -> SanitizeOutcome {
        let result = self.injection.sanitize(text, opts);
        SanitizeOutcome {
            success: true,
            text: result.text,
            was_blocked: result.was_blocked,
            was_modified: result.was_modified,
            risk_score: result.analysis.risk_score,
            risk_level: result.analysis.risk_level,
        }
    }

    /// Combined screen: safe means injection risk below Medium and no
    /// high-confidence PII.
    pub fn validate_content(&self, text: &str) -> ValidationOutcome {
        let pii_matches = self.pii.detect(text);
        let analysis = self.injection.analyze(text);
        let is_safe =
            analysis.risk_score < 0.3 && !pii_matches.iter().any(|m| m.confidence >= 0.9);
        ValidationOutcome {
            success: true,
            is_safe,
            pii_matches,
            injection_risk_score: analysis.risk_score,
            injection_risk_level: analysis.risk_level,
        }
    }

    // ── Knowledge-graph surface (secondary) ───────────────────────────────────

    pub fn extract_entities(&self, text: &str) -> Vec<Entity> {
        graph::extract_entities(text)
    }

    pub fn extract_relations(&self, text: &str) -> Vec<Relation> {
        graph::extract_relations(text)
    }

    /// Rebuild the tenant's graph from every live stored memory.
    pub async fn build_graph(
        &self,
        tenant_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GraphStats> {
        self.graph.clear(tenant_id);
        let memories = self
            .store
            .get_all(tenant_id, &MemoryFilter::default(), cancel)
            .await?;
        for memory in &memories {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            self.graph.ingest(tenant_id, &memory.content);
        }
        Ok(self.graph.stats(tenant_id))
    }

    pub fn query_graph(&self, tenant_id: &str, entity: &str) -> Vec<Relation> {
        self.graph.query(tenant_id, entity)
    }

    pub fn graph_stats(&self, tenant_id: &str) -> GraphStats {
        self.graph.stats(tenant_id)
    }

    pub fn clear_graph(&self, tenant_id: &str) {
        self.graph.clear(tenant_id);
    }

    // ── Component access ──────────────────────────────────────────────────────

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn memory_store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn embedding_gateway(&self) -> &Arc<EmbeddingGateway> {
        &self.gateway
    }

    pub fn sparse_index(&self) -> &Arc<Bm25Index> {
        &self.sparse
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn working_memory(&self) -> &WorkingMemoryManager {
        &self.working_memory
    }

    pub fn summarizer(&self) -> &Arc<ExtractiveSummarizer> {
        &self.summarizer
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn merge_engine(&self) -> &MergeEngine {
        &self.merge
    }

    pub fn lineage(&self) -> &Arc<LineageTracker> {
        &self.lineage
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Admission check. The limiter runs before any other work.
    fn admit(&self, tenant_id: &str, op: Operation) -> Result<()> {
        let decision = self.limiter.acquire(tenant_id, op);
        if decision.is_permitted {
            Ok(())
        } else {
            Err(rate_limited(decision))
        }
    }
}

/// A duplicate verdict must name the record it matched.
fn duplicate_target(check: &DuplicateCheckResult) -> Result<&MemoryUnit> {
    check.existing.as_ref().ok_or_else(|| {
        MemoryError::Internal("duplicate verdict carried no existing record".into())
    })
}

fn rate_limited(decision: RateLimitDecision) -> MemoryError {
    MemoryError::RateLimited {
        retry_after: decision
            .retry_after
            .unwrap_or(std::time::Duration::from_secs(1)),
        reason: decision
            .denial_reason
            .unwrap_or_else(|| "rate limit exceeded".to_string()),
    }
}

fn duplicate_report(check: &DuplicateCheckResult) -> DuplicateReport {
    DuplicateReport {
        duplicate_type: match check.duplicate_type {
            Some(DuplicateType::Exact) => "exact".to_string(),
            Some(DuplicateType::Semantic) => "semantic".to_string(),
            None => "none".to_string(),
        },
        similarity_score: check.similarity_score,
        existing_id: check.existing.as_ref().map(|e| e.id).unwrap_or(Uuid::nil()),
        recommended_action: match check.recommended_action {
            DuplicateAction::Add => "add",
            DuplicateAction::Skip => "skip",
            DuplicateAction::Update => "update",
            DuplicateAction::Merge => "merge",
            DuplicateAction::AddWithRelation => "add_with_relation",
        }
        .to_string(),
    }
}
