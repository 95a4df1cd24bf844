// src/embedding/mod.rs
//! EmbeddingProvider: maps text to a fixed-dimension dense vector.
//!
//! Pure function from the core's viewpoint (spec.md §4.1); in practice an
//! HTTP-backed external service. Every error this trait returns is treated
//! as transient by callers — permanent failures (e.g. "input too large")
//! still surface through the same `CoreError::Transient` classification,
//! the retry loop in `outbox::worker` is what eventually gives up.

mod http;

pub use http::HttpEmbeddingProvider;

use crate::error::CoreResult;
use async_trait::async_trait;

/// A provider of fixed-dimension dense embeddings. Implementations must be
/// deterministic for the same `(text, model)` pair.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// Embeds a batch of texts in as few upstream calls as the
    /// implementation's batching limit allows. The default implementation
    /// just calls `embed` once per text; HTTP-backed providers should
    /// override this to batch.
    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Expected output dimension, used by the index adapter to reject
    /// mismatches (spec.md §6, `EmbedDim`).
    fn dimension(&self) -> u64;
}
