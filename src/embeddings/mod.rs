// src/embeddings/mod.rs
//! Embedding gateway: content-hash caching, batch optimization, bounded
//! retries, and a hard per-call deadline in front of any provider.

mod local;
mod remote;

pub use local::HashedEmbedder;
pub use remote::RemoteEmbedder;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::core::traits::EmbeddingProvider;
use crate::error::{MemoryError, Result};

// ── Vector helpers ────────────────────────────────────────────────────────────

/// Scale a vector to unit length in place. A zero vector is left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product. For unit vectors this is the cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// ‖v‖ = 1 within the contract's ±1e-4 tolerance.
pub fn is_unit_norm(v: &[f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= 1e-4
}

struct CacheEntry {
    vector: Arc<Vec<f32>>,
    inserted_at: Instant,
}

/// Fronts a provider with a content-hash cache and retry/deadline policy.
/// Cloneable handles share the cache.
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbeddingConfig) -> Self {
        Self {
            provider,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build the gateway's provider from configuration. Unknown provider
    /// names fall back to the deterministic local embedder so the service
    /// stays usable offline.
    pub fn from_config(config: EmbeddingConfig) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
            "remote" => Arc::new(RemoteEmbedder::from_env(&config)),
            "local" => Arc::new(HashedEmbedder::new(config.dimensions)),
            other => {
                warn!("unknown embedding provider '{other}', using local");
                Arc::new(HashedEmbedder::new(config.dimensions))
            }
        };
        Self::new(provider, config)
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed one text, consulting the cache first.
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut out = self.embed_batch(&texts, cancel).await?;
        out.pop()
            .ok_or_else(|| MemoryError::Internal("provider returned no vector".into()))
    }

    /// Embed many texts. Cached entries are served directly; the rest go
    /// to the provider in batches of `max_batch_size` with bounded retry.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let keys: Vec<String> = texts.iter().map(|t| content_key(t)).collect();

        // Serve what we can from the cache.
        let mut resolved: Vec<Option<Arc<Vec<f32>>>> = vec![None; texts.len()];
        {
            let cache = self.cache.read().await;
            for (i, key) in keys.iter().enumerate() {
                if let Some(entry) = cache.get(key) {
                    if entry.inserted_at.elapsed() <= ttl {
                        resolved[i] = Some(entry.vector.clone());
                    }
                }
            }
        }

        // Deduplicate the misses so one API input covers repeated texts.
        let mut miss_keys: Vec<String> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if resolved[i].is_none() && !miss_keys.contains(key) {
                miss_keys.push(key.clone());
                miss_texts.push(texts[i].clone());
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                "embedding {} texts ({} served from cache)",
                miss_texts.len(),
                texts.len() - miss_texts.len()
            );
            let mut fresh: HashMap<String, Arc<Vec<f32>>> = HashMap::new();
            for chunk_start in (0..miss_texts.len()).step_by(self.config.max_batch_size) {
                if cancel.is_cancelled() {
                    return Err(MemoryError::Cancelled);
                }
                let chunk_end =
                    (chunk_start + self.config.max_batch_size).min(miss_texts.len());
                let chunk = &miss_texts[chunk_start..chunk_end];
                let vectors = self.call_provider(chunk, cancel).await?;
                for (offset, mut vector) in vectors.into_iter().enumerate() {
                    if vector.len() != self.dimensions() {
                        return Err(MemoryError::Transient(format!(
                            "provider returned dimension {} (expected {})",
                            vector.len(),
                            self.dimensions()
                        )));
                    }
                    if !is_unit_norm(&vector) {
                        l2_normalize(&mut vector);
                    }
                    fresh.insert(miss_keys[chunk_start + offset].clone(), Arc::new(vector));
                }
            }

            let mut cache = self.cache.write().await;
            cache.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
            for (key, vector) in &fresh {
                cache.insert(
                    key.clone(),
                    CacheEntry {
                        vector: vector.clone(),
                        inserted_at: Instant::now(),
                    },
                );
            }
            for (i, key) in keys.iter().enumerate() {
                if resolved[i].is_none() {
                    resolved[i] = fresh.get(key).cloned();
                }
            }
        }

        resolved
            .into_iter()
            .map(|slot| {
                slot.map(|arc| arc.as_ref().clone())
                    .ok_or_else(|| MemoryError::Internal("embedding slot unresolved".into()))
            })
            .collect()
    }

    /// One provider call with deadline and retry. Only Transient outcomes
    /// are retried; the backoff doubles each attempt with ±20% jitter.
    async fn call_provider(
        &self,
        chunk: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let mut attempt = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }
            let call = self.provider.embed_batch(chunk);
            let outcome = match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(MemoryError::Transient(format!(
                    "embedding call exceeded {}s deadline",
                    self.config.timeout_secs
                ))),
            };
            match outcome {
                Ok(vectors) => return Ok(vectors),
                Err(err) if matches!(err, MemoryError::Transient(_))
                    && attempt < self.config.max_retries =>
                {
                    let base = self.config.retry_base_delay_ms * (1u64 << attempt);
                    let jitter = rand::rng().random_range(0.8..=1.2);
                    let delay = Duration::from_millis((base as f64 * jitter) as u64);
                    warn!(
                        "embedding attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        err,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Cache key: hex SHA-256 of the raw text.
fn content_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ============================================================================
    // Vector helper tests
    // ============================================================================

    #[test]
    fn test_l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!(is_unit_norm(&v));
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn test_dot_of_unit_vector_with_itself_is_one() {
        let mut v = vec![0.2, -0.4, 0.9, 0.1];
        l2_normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    // ============================================================================
    // Gateway cache tests
    // ============================================================================

    struct CountingProvider {
        calls: AtomicUsize,
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut out = self.embed_batch(&[text.to_string()]).await?;
            Ok(out.pop().unwrap())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|_| {
                    let mut v = vec![1.0; self.dims];
                    l2_normalize(&mut v);
                    v
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }

    fn gateway(dims: usize) -> (EmbeddingGateway, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dims,
        });
        let config = EmbeddingConfig {
            dimensions: dims,
            ..Default::default()
        };
        (EmbeddingGateway::new(provider.clone(), config), provider)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let (gateway, provider) = gateway(8);
        let cancel = CancellationToken::new();
        gateway.embed("same text", &cancel).await.unwrap();
        gateway.embed("same text", &cancel).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_deduplicates_identical_texts() {
        let (gateway, provider) = gateway(8);
        let cancel = CancellationToken::new();
        let texts = vec!["a".to_string(), "a".to_string(), "a".to_string()];
        let out = gateway.embed_batch(&texts, &cancel).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let (gateway, _) = gateway(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gateway.embed("text", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn test_output_is_unit_normalized() {
        let (gateway, _) = gateway(16);
        let cancel = CancellationToken::new();
        let v = gateway.embed("anything", &cancel).await.unwrap();
        assert!(is_unit_norm(&v));
    }
}
