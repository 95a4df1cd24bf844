// src/index/mod.rs
//! SearchIndex: a vector+keyword index abstraction keyed by
//! `(actorId, memoryId)` and object id (spec.md §4.2).
//!
//! All storage and search goes through this trait — no direct vector-store
//! calls from business logic, the same discipline `memory::core::traits`
//! enforces for `MemoryStore` in the teacher crate. Production wiring uses
//! `QdrantIndex`; tests use `InMemoryIndex`.

mod memory;
mod qdrant;
pub mod scoring;

pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;

use crate::error::CoreResult;
use crate::model::{ContextHit, SearchHit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub type Payload = HashMap<String, Value>;

/// Vector+keyword index operations, restricted to `(actorId, memoryId)` on
/// every read.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Idempotent create-or-replace keyed by `id`.
    async fn upsert_entry(&self, id: &str, vector: &[f32], payload: Payload) -> CoreResult<()>;

    /// Idempotent create-or-replace keyed by `id`.
    async fn upsert_context(&self, id: &str, vector: &[f32], payload: Payload) -> CoreResult<()>;

    /// Deleting a nonexistent id is success.
    async fn delete_entry(&self, actor_id: &str, id: &str) -> CoreResult<()>;

    /// Deleting a nonexistent id is success.
    async fn delete_context(&self, actor_id: &str, id: &str) -> CoreResult<()>;

    /// Bulk scope delete; idempotent and safe to retry.
    async fn delete_memory(&self, actor_id: &str, memory_id: &str) -> CoreResult<()>;

    /// Bulk scope delete; idempotent and safe to retry.
    async fn delete_vault(&self, actor_id: &str, vault_id: &str) -> CoreResult<()>;

    /// Hybrid ranking over entries: convex combination of lexical
    /// (BM25-family) and dense-cosine scores weighted by `alpha` (the
    /// weight on the dense component). Ordering is by descending combined
    /// score, ties broken by descending `creationTime` then lexicographic
    /// id. `include_raw_entries = false` omits `raw_entry` from the
    /// returned payload without affecting ranking.
    async fn search(
        &self,
        actor_id: &str,
        memory_id: &str,
        query: &str,
        vector: &[f32],
        top_k: u32,
        alpha: f32,
        include_raw_entries: bool,
    ) -> CoreResult<Vec<SearchHit>>;

    /// Hybrid ranking over context shards, same contract as `search`.
    async fn search_contexts(
        &self,
        actor_id: &str,
        memory_id: &str,
        query: &str,
        vector: &[f32],
        top_k: u32,
        alpha: f32,
    ) -> CoreResult<Vec<ContextHit>>;

    /// The shard with the greatest `timestamp` for `(actorId, memoryId)`.
    /// Returns `None` (not an error) when none exist.
    async fn latest_context(
        &self,
        actor_id: &str,
        memory_id: &str,
    ) -> CoreResult<Option<(String, DateTime<Utc>)>>;
}
