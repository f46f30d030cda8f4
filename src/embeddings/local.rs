// src/embeddings/local.rs
// Deterministic offline embedder

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::l2_normalize;
use crate::core::traits::EmbeddingProvider;
use crate::error::Result;

/// Signed random-projection bag-of-words embedder. Fully deterministic:
/// the same text always maps to the same unit vector, and texts sharing
/// tokens land near each other. This is the offline default and the
/// provider the test suite runs against.
pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            // Four buckets per token, sign taken from the low bit.
            for lane in digest.chunks_exact(4).take(4) {
                let raw = u32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                let idx = (raw >> 1) as usize % self.dimensions;
                let sign = if raw & 1 == 0 { 1.0 } else { -1.0 };
                v[idx] += sign;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .into_iter()
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
