// src/core/traits.rs
//! Capability traits for memory backends and embedding providers.
//! All storage and recall goes through these—no backend specifics in
//! business logic.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::types::{MemoryFilter, MemoryUnit, SearchOptions};
use crate::error::Result;

/// Storage capability for memory records. The reference implementation is
/// the in-memory tenant-sharded index; a SQL backend with a vector
/// extension satisfies the same contract as long as the tenant pre-filter
/// runs before any scoring.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a record, assigning an id when it is nil. Returns the record
    /// as it was saved.
    async fn store(&self, unit: MemoryUnit) -> Result<MemoryUnit>;

    /// Store many records. Atomic per record; failures are per-record, not
    /// transactional across the batch.
    async fn store_batch(&self, units: Vec<MemoryUnit>) -> Vec<Result<MemoryUnit>>;

    /// Fetch by id within a tenant. A cross-tenant hit is treated as
    /// absent.
    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryUnit>>;

    /// Update an existing record. Requires matching (tenant, id); refreshes
    /// `updated_at`. Returns false if the record is absent.
    async fn update(&self, unit: &MemoryUnit) -> Result<bool>;

    /// Soft delete (`hard = false`) marks the record; hard delete removes
    /// it entirely.
    async fn delete(&self, tenant_id: &str, id: Uuid, hard: bool) -> Result<bool>;

    /// Dense search by cosine similarity over the tenant's slice.
    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        opts: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<(MemoryUnit, f32)>>;

    /// Filtered scan, ordered newest-updated first.
    async fn get_all(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryUnit>>;

    /// Live (non-soft-deleted) record count for a tenant.
    async fn count(&self, tenant_id: &str) -> Result<u64>;
}

/// Text-to-vector capability. Implementations must return unit-normalized
/// vectors of a fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}
