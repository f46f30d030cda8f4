// src/core/types.rs

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Classification of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Episodic,
    Semantic,
    Procedural,
    Fact,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Fact => "fact",
        }
    }

    /// Parse a caller-supplied type name. Unknown values are a BadRequest,
    /// not a silent default.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "fact" => Ok(MemoryType::Fact),
            other => Err(MemoryError::BadRequest(format!(
                "unknown memory type '{other}'"
            ))),
        }
    }
}

/// The central record: one remembered piece of text with its embedding and
/// temporal/importance metadata. Owned by the memory index; retrievers see
/// read snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUnit {
    /// Globally unique. `Uuid::nil()` means "assign on insert".
    pub id: Uuid,
    /// Isolation key. Every read and write is scoped by it.
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub content: String,
    pub memory_type: MemoryType,
    /// Unit-normalized, length equal to the gateway's configured dimension.
    pub embedding: Option<Vec<f32>>,
    /// In [0, 1].
    pub importance: f32,
    pub topics: BTreeSet<String>,
    /// Free-form annotations. The ingest path sets `content_hash`.
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub is_deleted: bool,
}

impl MemoryUnit {
    pub fn new(tenant_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            tenant_id: tenant_id.into(),
            session_id: None,
            content: content.into(),
            memory_type: MemoryType::Episodic,
            embedding: None,
            importance: 0.5,
            topics: BTreeSet::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            is_deleted: false,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Age in fractional days relative to `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f32 {
        let secs = (now - self.created_at).num_seconds().max(0) as f32;
        secs / 86_400.0
    }

    /// Refresh access bookkeeping after a recall hit.
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = Some(now);
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get("content_hash").map(String::as_str)
    }
}

/// Structural filters applied before any scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub session_id: Option<String>,
    pub types: Option<Vec<MemoryType>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    /// Does `unit` pass every structural predicate? Tenant scoping happens
    /// before this is consulted.
    pub fn matches(&self, unit: &MemoryUnit) -> bool {
        if unit.is_deleted && !self.include_deleted {
            return false;
        }
        if let Some(ref session_id) = self.session_id {
            if unit.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(ref types) = self.types {
            if !types.contains(&unit.memory_type) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if unit.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if unit.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Options for a dense search against the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub filter: MemoryFilter,
    pub min_score: f32,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            filter: MemoryFilter::default(),
            min_score: 0.0,
            limit: 10,
        }
    }
}

/// A memory with its composite retrieval score and the component scores
/// that produced it.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemoryUnit,
    pub score: f32,
    pub relevance_score: f32,
    pub recency_score: f32,
    pub importance_score: f32,
}

/// A conversation grouping inside a tenant. Created lazily on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub tenant_id: String,
    pub session_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Deterministic result ordering: score descending, then `updated_at`
/// descending, then id ascending. Every ranked surface uses this so equal
/// scores tie-break identically across runs.
pub fn sort_by_score(results: &mut [(MemoryUnit, f32)]) {
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
}
