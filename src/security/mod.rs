// src/security/mod.rs

//! Input security: PII detection/redaction and prompt-injection
//! scoring/sanitization. All patterns compile once at startup.

pub mod injection;
pub mod pii;

pub use injection::{
    InjectionAnalysis, InjectionDetector, InjectionMatch, InjectionType, RiskLevel,
    SanitizeMode, SanitizeOptions, SanitizeResult,
};
pub use pii::{
    PiiDetector, PiiMatch, PiiType, Redaction, RedactionMode, RedactionResult,
};
