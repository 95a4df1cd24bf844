// src/index/memory.rs
// In-memory SearchIndex fake for tests, implementing the same hybrid-scoring
// contract as QdrantIndex without an external dependency.

use super::scoring::{self, Bm25Corpus};
use super::{Payload, SearchIndex};
use crate::error::{CoreError, CoreResult};
use crate::model::{ContextHit, SearchHit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Clone)]
struct StoredEntry {
    actor_id: String,
    memory_id: String,
    vector: Vec<f32>,
    summary: String,
    raw_entry: Option<String>,
    tags: Option<HashMap<String, String>>,
    creation_time: DateTime<Utc>,
    conversation_time: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct StoredContext {
    actor_id: String,
    memory_id: String,
    vault_id: Option<String>,
    vector: Vec<f32>,
    content: String,
    timestamp: DateTime<Utc>,
}

/// Test-only `SearchIndex` backed by two in-process maps, scoring queries the
/// same way `QdrantIndex` does (cosine + BM25 rerank) so tests exercise real
/// ranking behavior rather than a stub.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, StoredEntry>>,
    contexts: RwLock<HashMap<String, StoredContext>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_field<'a>(payload: &'a Payload, key: &str) -> Option<&'a serde_json::Value> {
        payload.get(key)
    }

    fn required_string(payload: &Payload, key: &str) -> CoreResult<String> {
        Self::get_field(payload, key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::permanent(format!("payload missing required field {key}")))
    }

    fn required_datetime(payload: &Payload, key: &str) -> CoreResult<DateTime<Utc>> {
        Self::get_field(payload, key)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CoreError::permanent(format!("payload missing required field {key}")))
    }

    fn optional_datetime(payload: &Payload, key: &str) -> Option<DateTime<Utc>> {
        Self::get_field(payload, key)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn optional_tags(payload: &Payload) -> Option<HashMap<String, String>> {
        Self::get_field(payload, "tags").and_then(|v| {
            serde_json::from_value::<HashMap<String, String>>(v.clone()).ok()
        })
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn upsert_entry(&self, id: &str, vector: &[f32], payload: Payload) -> CoreResult<()> {
        let entry = StoredEntry {
            actor_id: Self::required_string(&payload, "actor_id")?,
            memory_id: Self::required_string(&payload, "memory_id")?,
            vector: vector.to_vec(),
            summary: Self::required_string(&payload, "summary")?,
            raw_entry: Self::get_field(&payload, "raw_entry")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            tags: Self::optional_tags(&payload),
            creation_time: Self::required_datetime(&payload, "creation_time")?,
            conversation_time: Self::optional_datetime(&payload, "conversation_time"),
        };

        self.entries.write().insert(id.to_string(), entry);
        Ok(())
    }

    async fn upsert_context(&self, id: &str, vector: &[f32], payload: Payload) -> CoreResult<()> {
        let context = StoredContext {
            actor_id: Self::required_string(&payload, "actor_id")?,
            memory_id: Self::required_string(&payload, "memory_id")?,
            vault_id: Self::get_field(&payload, "vault_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            vector: vector.to_vec(),
            content: Self::required_string(&payload, "content")?,
            timestamp: Self::required_datetime(&payload, "timestamp")?,
        };

        self.contexts.write().insert(id.to_string(), context);
        Ok(())
    }

    async fn delete_entry(&self, _actor_id: &str, id: &str) -> CoreResult<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    async fn delete_context(&self, _actor_id: &str, id: &str) -> CoreResult<()> {
        self.contexts.write().remove(id);
        Ok(())
    }

    async fn delete_memory(&self, actor_id: &str, memory_id: &str) -> CoreResult<()> {
        self.entries
            .write()
            .retain(|_, e| !(e.actor_id == actor_id && e.memory_id == memory_id));
        self.contexts
            .write()
            .retain(|_, c| !(c.actor_id == actor_id && c.memory_id == memory_id));
        Ok(())
    }

    async fn delete_vault(&self, actor_id: &str, vault_id: &str) -> CoreResult<()> {
        self.contexts
            .write()
            .retain(|_, c| !(c.actor_id == actor_id && c.vault_id.as_deref() == Some(vault_id)));
        Ok(())
    }

    async fn search(
        &self,
        actor_id: &str,
        memory_id: &str,
        query: &str,
        vector: &[f32],
        top_k: u32,
        alpha: f32,
        include_raw_entries: bool,
    ) -> CoreResult<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let scoped: Vec<(&String, &StoredEntry)> = entries
            .iter()
            .filter(|(_, e)| e.actor_id == actor_id && e.memory_id == memory_id)
            .collect();

        let corpus = Bm25Corpus::build(scoped.iter().map(|(_, e)| e.summary.as_str()));

        let mut scored: Vec<(f32, SearchHit)> = scoped
            .into_iter()
            .map(|(id, e)| {
                let dense = scoring::cosine_similarity(vector, &e.vector).clamp(0.0, 1.0);
                let lexical = scoring::normalize_lexical(corpus.score(query, &e.summary));
                let combined = scoring::combine(alpha, lexical, dense);

                (
                    combined,
                    SearchHit {
                        entry_id: id.clone(),
                        summary: e.summary.clone(),
                        raw_entry: if include_raw_entries { e.raw_entry.clone() } else { None },
                        tags: e.tags.clone(),
                        creation_time: e.creation_time,
                        conversation_time: e.conversation_time,
                        score: combined,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.creation_time.cmp(&a.1.creation_time))
                .then_with(|| a.1.entry_id.cmp(&b.1.entry_id))
        });
        scored.truncate(top_k as usize);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn search_contexts(
        &self,
        actor_id: &str,
        memory_id: &str,
        query: &str,
        vector: &[f32],
        top_k: u32,
        alpha: f32,
    ) -> CoreResult<Vec<ContextHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let contexts = self.contexts.read();
        let scoped: Vec<(&String, &StoredContext)> = contexts
            .iter()
            .filter(|(_, c)| c.actor_id == actor_id && c.memory_id == memory_id)
            .collect();

        let corpus = Bm25Corpus::build(scoped.iter().map(|(_, c)| c.content.as_str()));

        let mut scored: Vec<(f32, ContextHit)> = scoped
            .into_iter()
            .map(|(id, c)| {
                let dense = scoring::cosine_similarity(vector, &c.vector).clamp(0.0, 1.0);
                let lexical = scoring::normalize_lexical(corpus.score(query, &c.content));
                let combined = scoring::combine(alpha, lexical, dense);

                (
                    combined,
                    ContextHit {
                        context_id: id.clone(),
                        content: c.content.clone(),
                        timestamp: c.timestamp,
                        score: combined,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
                .then_with(|| a.1.context_id.cmp(&b.1.context_id))
        });
        scored.truncate(top_k as usize);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn latest_context(
        &self,
        actor_id: &str,
        memory_id: &str,
    ) -> CoreResult<Option<(String, DateTime<Utc>)>> {
        let contexts = self.contexts.read();
        let latest = contexts
            .iter()
            .filter(|(_, c)| c.actor_id == actor_id && c.memory_id == memory_id)
            .max_by_key(|(id, c)| (c.timestamp, id.clone()))
            .map(|(id, c)| (id.clone(), c.timestamp));

        Ok(latest)
    }
}
