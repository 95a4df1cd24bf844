// src/embedding/http.rs
// HTTP-backed embedding provider, generalized from
// `llm::provider::openai::OpenAiEmbeddings` — same request shape, made
// provider-agnostic via a configurable endpoint/model.

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub struct HttpEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
    dimension: u64,
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbeddingConfig, dimension: u64) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            dimension,
        })
    }

    async fn post_embeddings(&self, input: Value) -> CoreResult<Value> {
        let body = json!({
            "model": self.config.model,
            "input": input,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("embedding provider returned {}: {}", status, text);
            return Err(CoreError::Transient(format!(
                "embedding provider error {status}: {text}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CoreError::Transient(format!("invalid embedding response: {e}")))
    }

    fn extract_vector(item: &Value) -> Option<Vec<f32>> {
        item["embedding"].as_array().map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect()
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let raw = self.post_embeddings(json!(text)).await?;

        let vector = raw["data"][0]
            .as_object()
            .and_then(|_| Self::extract_vector(&raw["data"][0]))
            .ok_or_else(|| CoreError::Transient("no embedding in response".to_string()))?;

        debug!("embedded {} chars into a {}-dim vector", text.len(), vector.len());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.max_batch_size.max(1)) {
            let raw = self.post_embeddings(json!(chunk)).await?;
            let data = raw["data"]
                .as_array()
                .ok_or_else(|| CoreError::Transient("no data array in response".to_string()))?;

            for item in data {
                let vector = Self::extract_vector(item)
                    .ok_or_else(|| CoreError::Transient("missing embedding in batch item".to_string()))?;
                all.push(vector);
            }
        }

        Ok(all)
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }
}
