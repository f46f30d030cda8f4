// src/error.rs
// Standardized error types for recollect

use std::time::Duration;

use thiserror::Error;

/// Main error type for the memory service.
///
/// Every component reports one of these kinds; wrappers preserve the kind
/// and add context. The outward service boundary converts errors into
/// structured result objects instead of propagating them.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Malformed input: empty tenant, wrong embedding dimension, unknown
    /// enum value, and similar caller mistakes.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The id does not exist in the requested tenant. Cross-tenant hits
    /// map here as well.
    #[error("not found: {0}")]
    NotFound(String),

    /// Admission denied by the rate limiter.
    #[error("rate limited: {reason}")]
    RateLimited {
        retry_after: Duration,
        reason: String,
    },

    /// An exact duplicate was detected under a policy that reports it as
    /// an error. The duplicate engine itself never raises this.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend or embedding I/O failure; callers should retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Cooperative cancellation honored.
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation. Not reachable in a correct implementation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Result using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Short machine-readable kind, used in structured results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::BadRequest(_) => "bad_request",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::RateLimited { .. } => "rate_limited",
            MemoryError::Conflict(_) => "conflict",
            MemoryError::Transient(_) => "transient",
            MemoryError::Cancelled => "cancelled",
            MemoryError::Internal(_) => "internal",
        }
    }

    /// Convert to user-facing string for the service boundary
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }

    /// Whether a caller retry is reasonable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoryError::Transient(_) | MemoryError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        MemoryError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::BadRequest(format!("malformed payload: {err}"))
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            MemoryError::Cancelled
        } else {
            MemoryError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(MemoryError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(MemoryError::Cancelled.kind(), "cancelled");
        assert_eq!(
            MemoryError::RateLimited {
                retry_after: Duration::from_secs(1),
                reason: "burst".into()
            }
            .kind(),
            "rate_limited"
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(MemoryError::Transient("io".into()).is_retryable());
        assert!(!MemoryError::NotFound("gone".into()).is_retryable());
        assert!(!MemoryError::Cancelled.is_retryable());
    }
}
