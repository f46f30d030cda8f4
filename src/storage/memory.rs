// src/storage/memory.rs
//! Reference memory index: a tenant-sharded in-memory map.
//!
//! The tenant predicate is applied before any scoring — the shard lookup
//! IS the pre-filter, so one tenant's scan cost and results can never leak
//! into another's.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::core::traits::MemoryStore;
use crate::core::types::{sort_by_score, MemoryFilter, MemoryUnit, SearchOptions};
use crate::embeddings::{dot, is_unit_norm};
use crate::error::{MemoryError, Result};

struct TenantShard {
    records: RwLock<HashMap<Uuid, MemoryUnit>>,
}

impl TenantShard {
    fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

/// In-memory `MemoryStore`. Readers take shard read locks; writers take
/// the shard write lock, so writes serialize per tenant and never across
/// tenants.
pub struct InMemoryStore {
    dimensions: usize,
    shards: RwLock<HashMap<String, Arc<TenantShard>>>,
}

impl InMemoryStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            shards: RwLock::new(HashMap::new()),
        }
    }

    async fn shard(&self, tenant_id: &str) -> Arc<TenantShard> {
        if let Some(shard) = self.shards.read().await.get(tenant_id) {
            return shard.clone();
        }
        let mut shards = self.shards.write().await;
        shards
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantShard::new()))
            .clone()
    }

    async fn shard_if_exists(&self, tenant_id: &str) -> Option<Arc<TenantShard>> {
        self.shards.read().await.get(tenant_id).cloned()
    }

    fn validate(&self, unit: &MemoryUnit) -> Result<()> {
        if unit.tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        if unit.content.is_empty() {
            return Err(MemoryError::BadRequest("content must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&unit.importance) {
            return Err(MemoryError::BadRequest(format!(
                "importance {} outside [0, 1]",
                unit.importance
            )));
        }
        if let Some(ref embedding) = unit.embedding {
            if embedding.len() != self.dimensions {
                return Err(MemoryError::BadRequest(format!(
                    "embedding dimension {} (expected {})",
                    embedding.len(),
                    self.dimensions
                )));
            }
            if !is_unit_norm(embedding) {
                return Err(MemoryError::BadRequest(
                    "embedding is not unit-normalized".into(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, mut unit: MemoryUnit) -> Result<MemoryUnit> {
        self.validate(&unit)?;

        if unit.id.is_nil() {
            unit.id = Uuid::new_v4();
        }
        let now = Utc::now();
        unit.created_at = now;
        unit.updated_at = now;

        let shard = self.shard(&unit.tenant_id).await;
        let mut records = shard.records.write().await;
        if records.contains_key(&unit.id) {
            return Err(MemoryError::BadRequest(format!(
                "id {} already stored",
                unit.id
            )));
        }
        records.insert(unit.id, unit.clone());
        debug!("stored memory {} for tenant {}", unit.id, unit.tenant_id);
        Ok(unit)
    }

    async fn store_batch(&self, units: Vec<MemoryUnit>) -> Vec<Result<MemoryUnit>> {
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            results.push(self.store(unit).await);
        }
        results
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryUnit>> {
        if tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        let Some(shard) = self.shard_if_exists(tenant_id).await else {
            return Ok(None);
        };
        let record = shard.records.read().await.get(&id).cloned();
        Ok(record)
    }

    async fn update(&self, unit: &MemoryUnit) -> Result<bool> {
        self.validate(unit)?;
        let Some(shard) = self.shard_if_exists(&unit.tenant_id).await else {
            return Ok(false);
        };
        let mut records = shard.records.write().await;
        let Some(existing) = records.get_mut(&unit.id) else {
            return Ok(false);
        };

        let created_at = existing.created_at;
        let mut updated = unit.clone();
        // created_at is immutable after insert; updated_at never regresses.
        updated.created_at = created_at;
        updated.updated_at = Utc::now().max(created_at);
        *existing = updated;
        Ok(true)
    }

    async fn delete(&self, tenant_id: &str, id: Uuid, hard: bool) -> Result<bool> {
        let Some(shard) = self.shard_if_exists(tenant_id).await else {
            return Ok(false);
        };
        let mut records = shard.records.write().await;
        if hard {
            Ok(records.remove(&id).is_some())
        } else {
            match records.get_mut(&id) {
                Some(unit) => {
                    unit.is_deleted = true;
                    unit.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &[f32],
        opts: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<(MemoryUnit, f32)>> {
        if tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        if query.len() != self.dimensions {
            return Err(MemoryError::BadRequest(format!(
                "query dimension {} (expected {})",
                query.len(),
                self.dimensions
            )));
        }
        let Some(shard) = self.shard_if_exists(tenant_id).await else {
            return Ok(vec![]);
        };

        let records = shard.records.read().await;
        let mut scored = Vec::new();
        for unit in records.values() {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            if !opts.filter.matches(unit) {
                continue;
            }
            let Some(ref embedding) = unit.embedding else {
                continue;
            };
            let score = dot(query, embedding);
            if score < opts.min_score {
                continue;
            }
            scored.push((unit.clone(), score));
        }
        drop(records);

        sort_by_score(&mut scored);
        scored.truncate(opts.limit);
        Ok(scored)
    }

    async fn get_all(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryUnit>> {
        if tenant_id.trim().is_empty() {
            return Err(MemoryError::BadRequest("tenant_id must not be empty".into()));
        }
        let Some(shard) = self.shard_if_exists(tenant_id).await else {
            return Ok(vec![]);
        };

        let records = shard.records.read().await;
        let mut out = Vec::new();
        for unit in records.values() {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            if filter.matches(unit) {
                out.push(unit.clone());
            }
        }
        drop(records);

        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn count(&self, tenant_id: &str) -> Result<u64> {
        let Some(shard) = self.shard_if_exists(tenant_id).await else {
            return Ok(0);
        };
        let records = shard.records.read().await;
        Ok(records.values().filter(|u| !u.is_deleted).count() as u64)
    }
}
