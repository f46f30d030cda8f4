// src/embeddings/remote.rs
// HTTPS embeddings API client (OpenAI-compatible wire shape)

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::core::traits::EmbeddingProvider;
use crate::error::{MemoryError, Result};

/// Max characters per input (longer text is truncated before upload)
const MAX_TEXT_CHARS: usize = 8000;

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Remote embedding provider speaking the `/embeddings` JSON shape with a
/// bearer token. Retry and deadline policy live in the gateway, not here;
/// this client does one request per call and reports failures as
/// Transient.
pub struct RemoteEmbedder {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(api_url: String, api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
            dimensions,
        }
    }

    /// Endpoint and key come from the environment; model and dimension
    /// from the embedding config.
    pub fn from_env(config: &EmbeddingConfig) -> Self {
        let api_url = std::env::var("RECOLLECT_EMBED_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/embeddings".to_string());
        let api_key = std::env::var("RECOLLECT_EMBED_API_KEY").unwrap_or_default();
        Self::new(api_url, api_key, config.model.clone(), config.dimensions)
    }

    fn truncate(text: &str) -> &str {
        if text.len() > MAX_TEXT_CHARS {
            let mut end = MAX_TEXT_CHARS;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| MemoryError::Transient("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let inputs: Vec<&str> = texts.iter().map(|t| Self::truncate(t)).collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        debug!("requesting {} embeddings from {}", inputs.len(), self.api_url);

        let response = self
            .http_client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MemoryError::Transient(format!(
                "embeddings API returned {status}: {text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Transient(format!("malformed embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(MemoryError::Transient(format!(
                "embedding response count {} != request count {}",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut out = Vec::with_capacity(parsed.data.len());
        for datum in parsed.data {
            if datum.embedding.len() != self.dimensions {
                return Err(MemoryError::Transient(format!(
                    "embedding dimension {} (expected {})",
                    datum.embedding.len(),
                    self.dimensions
                )));
            }
            out.push(datum.embedding);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
