// src/service/types.rs
//! Structured results for the outward boundary. Operations never throw
//! past the service — every outcome carries `success`, an optional
//! message, and typed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{MemoryType, MemoryUnit};
use crate::error::MemoryError;
use crate::lineage::{LineageEvent, MemoryRelation};
use crate::security::{InjectionMatch, PiiMatch, Redaction, RiskLevel};

/// Ingestion request for one memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub tenant_id: String,
    pub content: String,
    pub memory_type: Option<MemoryType>,
    pub importance: Option<f32>,
    pub topics: Vec<String>,
    pub session_id: Option<String>,
}

impl StoreRequest {
    pub fn new(tenant_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            content: content.into(),
            memory_type: None,
            importance: None,
            topics: vec![],
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallRequest {
    pub tenant_id: String,
    pub query: String,
    pub limit: Option<usize>,
    pub memory_type: Option<MemoryType>,
    pub session_id: Option<String>,
}

impl RecallRequest {
    pub fn new(tenant_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            query: query.into(),
            limit: None,
            memory_type: None,
            session_id: None,
        }
    }
}

/// How a stored memory related to an existing one, when it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub duplicate_type: String,
    pub similarity_score: f32,
    pub existing_id: Uuid,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub success: bool,
    pub id: Option<Uuid>,
    pub duplicate: Option<DuplicateReport>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallItem {
    pub id: Uuid,
    pub content: String,
    pub memory_type: MemoryType,
    pub score: f32,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallOutcome {
    pub success: bool,
    pub items: Vec<RecallItem>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetOutcome {
    pub success: bool,
    pub memory: Option<MemoryUnit>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOutcome {
    pub success: bool,
    pub total: u64,
    pub returned: usize,
    pub items: Vec<MemoryUnit>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
}

/// Update / delete result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub results: Vec<StoreOutcome>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiOutcome {
    pub success: bool,
    pub matches: Vec<PiiMatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactOutcome {
    pub success: bool,
    pub redacted: String,
    pub redactions: Vec<Redaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionOutcome {
    pub success: bool,
    pub risk_score: f32,
    pub risk_level: RiskLevel,
    pub matches: Vec<InjectionMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeOutcome {
    pub success: bool,
    pub text: String,
    pub was_blocked: bool,
    pub was_modified: bool,
    pub risk_score: f32,
    pub risk_level: RiskLevel,
}

/// Combined safety check over both detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub is_safe: bool,
    pub pii_matches: Vec<PiiMatch>,
    pub injection_risk_score: f32,
    pub injection_risk_level: RiskLevel,
}

/// Result of summarizing a slice of a tenant's memories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizeOutcome {
    pub success: bool,
    /// Set when the summary was archived as a memory of its own.
    pub summary_id: Option<Uuid>,
    pub content: String,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub token_estimate: usize,
    pub source_count: usize,
    pub message: Option<String>,
    pub error_kind: Option<String>,
}

/// A memory's audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryOutcome {
    pub success: bool,
    pub events: Vec<LineageEvent>,
    pub relations: Vec<MemoryRelation>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
}

pub(crate) trait FromError {
    fn from_error(err: &MemoryError) -> Self;
}

fn retry_secs(err: &MemoryError) -> Option<u64> {
    match err {
        MemoryError::RateLimited { retry_after, .. } => Some(retry_after.as_secs().max(1)),
        _ => None,
    }
}

impl FromError for StoreOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            retry_after_secs: retry_secs(err),
            ..Default::default()
        }
    }
}

impl FromError for RecallOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            retry_after_secs: retry_secs(err),
            ..Default::default()
        }
    }
}

impl FromError for GetOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            ..Default::default()
        }
    }
}

impl FromError for ListOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            ..Default::default()
        }
    }
}

impl FromError for OpOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            retry_after_secs: retry_secs(err),
        }
    }
}

impl FromError for BatchOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            retry_after_secs: retry_secs(err),
            ..Default::default()
        }
    }
}

impl FromError for SummarizeOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            ..Default::default()
        }
    }
}

impl FromError for HistoryOutcome {
    fn from_error(err: &MemoryError) -> Self {
        Self {
            success: false,
            message: Some(err.to_user_string()),
            error_kind: Some(err.kind().to_string()),
            ..Default::default()
        }
    }
}
