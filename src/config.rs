// src/config.rs
// Service configuration, one struct per concern

use serde::{Deserialize, Serialize};
use tracing::warn;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("ignoring unparseable {key}={raw}");
                default
            }
        },
        Err(_) => default,
    }
}

/// Embedding gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider selector: "local" (deterministic hashed) or "remote".
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    /// Deadline for a single provider call; exceeded calls surface as Transient.
    pub timeout_secs: u64,
    /// Content-hash cache entry lifetime.
    pub cache_ttl_secs: u64,
    pub max_batch_size: usize,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "hashed-miniature".to_string(),
            dimensions: 384,
            timeout_secs: 60,
            cache_ttl_secs: 300,
            max_batch_size: 64,
            max_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            provider: env_or("RECOLLECT_EMBED_PROVIDER", default.provider),
            model: env_or("RECOLLECT_EMBED_MODEL", default.model),
            dimensions: env_or("RECOLLECT_EMBED_DIMENSIONS", default.dimensions),
            timeout_secs: env_or("RECOLLECT_EMBED_TIMEOUT_SECS", default.timeout_secs),
            cache_ttl_secs: env_or("RECOLLECT_EMBED_CACHE_TTL_SECS", default.cache_ttl_secs),
            max_batch_size: env_or("RECOLLECT_EMBED_MAX_BATCH", default.max_batch_size),
            max_retries: env_or("RECOLLECT_EMBED_MAX_RETRIES", default.max_retries),
            retry_base_delay_ms: env_or(
                "RECOLLECT_EMBED_RETRY_BASE_MS",
                default.retry_base_delay_ms,
            ),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub rrf_k: f32,
    /// Similarity at or above which a new memory counts as a duplicate.
    pub duplicate_threshold: f32,
    /// Paraphrase variants generated during query expansion (original excluded).
    pub expansion_variants: usize,
    /// How many records the exact-hash duplicate scan walks, newest first.
    pub dedup_scan_window: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            dense_weight: 0.6,
            sparse_weight: 0.4,
            rrf_k: 60.0,
            duplicate_threshold: 0.85,
            expansion_variants: 3,
            dedup_scan_window: 1000,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            default_limit: env_or("RECOLLECT_SEARCH_DEFAULT_LIMIT", default.default_limit),
            dense_weight: env_or("RECOLLECT_SEARCH_DENSE_WEIGHT", default.dense_weight),
            sparse_weight: env_or("RECOLLECT_SEARCH_SPARSE_WEIGHT", default.sparse_weight),
            rrf_k: env_or("RECOLLECT_SEARCH_RRF_K", default.rrf_k),
            duplicate_threshold: env_or(
                "RECOLLECT_DUPLICATE_THRESHOLD",
                default.duplicate_threshold,
            ),
            expansion_variants: env_or(
                "RECOLLECT_EXPANSION_VARIANTS",
                default.expansion_variants,
            ),
            dedup_scan_window: env_or("RECOLLECT_DEDUP_SCAN_WINDOW", default.dedup_scan_window),
        }
    }
}

/// Composite rescoring weights. Normalized before use, so only the ratios
/// matter. `decay` is the per-day retention used for the recency term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub relevance_weight: f32,
    pub recency_weight: f32,
    pub importance_weight: f32,
    pub decay: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 1.0,
            recency_weight: 1.0,
            importance_weight: 1.0,
            decay: 0.99,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            relevance_weight: env_or("RECOLLECT_SCORE_RELEVANCE_WEIGHT", default.relevance_weight),
            recency_weight: env_or("RECOLLECT_SCORE_RECENCY_WEIGHT", default.recency_weight),
            importance_weight: env_or(
                "RECOLLECT_SCORE_IMPORTANCE_WEIGHT",
                default.importance_weight,
            ),
            decay: env_or("RECOLLECT_SCORE_DECAY", default.decay),
        }
    }
}

/// Per-operation and global admission caps, permits per window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub store_permits: usize,
    pub recall_permits: usize,
    pub update_permits: usize,
    pub delete_permits: usize,
    pub batch_permits: usize,
    pub global_permits: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            store_permits: 60,
            recall_permits: 100,
            update_permits: 30,
            delete_permits: 20,
            batch_permits: 10,
            global_permits: 200,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            enabled: env_or("RECOLLECT_RATE_LIMIT_ENABLED", default.enabled),
            window_secs: env_or("RECOLLECT_RATE_LIMIT_WINDOW_SECS", default.window_secs),
            store_permits: env_or("RECOLLECT_RATE_LIMIT_STORE", default.store_permits),
            recall_permits: env_or("RECOLLECT_RATE_LIMIT_RECALL", default.recall_permits),
            update_permits: env_or("RECOLLECT_RATE_LIMIT_UPDATE", default.update_permits),
            delete_permits: env_or("RECOLLECT_RATE_LIMIT_DELETE", default.delete_permits),
            batch_permits: env_or("RECOLLECT_RATE_LIMIT_BATCH", default.batch_permits),
            global_permits: env_or("RECOLLECT_RATE_LIMIT_GLOBAL", default.global_permits),
        }
    }
}

/// Working-memory bounds and reflection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryConfig {
    pub max_tokens: usize,
    pub reflection_threshold: f32,
    pub max_recent_summaries: usize,
    pub tokens_per_word: f32,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: 128_000,
            reflection_threshold: 10.0,
            max_recent_summaries: 5,
            tokens_per_word: 1.3,
        }
    }
}

impl WorkingMemoryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_tokens: env_or("RECOLLECT_WM_MAX_TOKENS", default.max_tokens),
            reflection_threshold: env_or(
                "RECOLLECT_WM_REFLECTION_THRESHOLD",
                default.reflection_threshold,
            ),
            max_recent_summaries: env_or(
                "RECOLLECT_WM_MAX_RECENT_SUMMARIES",
                default.max_recent_summaries,
            ),
            tokens_per_word: env_or("RECOLLECT_WM_TOKENS_PER_WORD", default.tokens_per_word),
        }
    }
}

/// Summarizer budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Fraction of the source token estimate the summary may keep.
    pub ratio: f32,
    pub max_output_tokens: usize,
    /// Sentences shorter than this many characters are never candidates.
    pub min_sentence_chars: usize,
    pub max_key_points: usize,
    pub max_entities: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            ratio: 0.3,
            max_output_tokens: 512,
            min_sentence_chars: 10,
            max_key_points: 5,
            max_entities: 20,
        }
    }
}

impl SummaryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            ratio: env_or("RECOLLECT_SUMMARY_RATIO", default.ratio),
            max_output_tokens: env_or(
                "RECOLLECT_SUMMARY_MAX_OUTPUT_TOKENS",
                default.max_output_tokens,
            ),
            min_sentence_chars: env_or(
                "RECOLLECT_SUMMARY_MIN_SENTENCE_CHARS",
                default.min_sentence_chars,
            ),
            max_key_points: env_or("RECOLLECT_SUMMARY_MAX_KEY_POINTS", default.max_key_points),
            max_entities: env_or("RECOLLECT_SUMMARY_MAX_ENTITIES", default.max_entities),
        }
    }
}

/// Ingest-time security policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Redact detected PII before the content is embedded and stored.
    pub redact_before_store: bool,
    /// Ingest is refused when the injection risk score reaches this value.
    pub block_risk_threshold: f32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            redact_before_store: false,
            block_risk_threshold: 0.8,
        }
    }
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redact_before_store: env_or(
                "RECOLLECT_SECURITY_REDACT_BEFORE_STORE",
                default.redact_before_store,
            ),
            block_risk_threshold: env_or(
                "RECOLLECT_SECURITY_BLOCK_RISK",
                default.block_risk_threshold,
            ),
        }
    }
}

/// Everything the service needs, bundled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub rate_limit: RateLimitConfig,
    pub working_memory: WorkingMemoryConfig,
    pub summary: SummaryConfig,
    pub security: SecurityConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            embedding: EmbeddingConfig::from_env(),
            search: SearchConfig::from_env(),
            scoring: ScoringConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            working_memory: WorkingMemoryConfig::from_env(),
            summary: SummaryConfig::from_env(),
            security: SecurityConfig::from_env(),
        }
    }
}
