// src/index/qdrant.rs
// Qdrant-backed SearchIndex, generalized from
// `memory::storage::qdrant::multi_store::QdrantMultiStore`: the teacher keeps
// 3 fixed semantic-head collections (code/conversation/git) scoped by
// session_id; this adapter keeps 2 collections (entries/contexts) scoped by
// `(actorId, memoryId)` payload fields, per spec.md §4.2.

use super::scoring::{self, Bm25Corpus};
use super::{Payload, SearchIndex};
use crate::config::IndexConfig;
use crate::error::{CoreError, CoreResult, IntoCoreError};
use crate::model::{ContextHit, SearchHit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};

const ENTRIES_COLLECTION: &str = "entries";
const CONTEXTS_COLLECTION: &str = "contexts";

/// Overfetch factor applied to `top_k` before the lexical rerank, so the
/// lexical component has more than `top_k` dense-only candidates to rescore.
const OVERFETCH_FACTOR: u64 = 4;
const MIN_FETCH: u64 = 20;

pub struct QdrantIndex {
    client: Qdrant,
    prefix: String,
}

impl QdrantIndex {
    pub async fn new(config: &IndexConfig) -> CoreResult<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .skip_compatibility_check()
            .build()
            .transient_context("failed to connect to qdrant")?;

        let index = Self {
            client,
            prefix: config.collection_prefix.clone(),
        };

        index.ensure_collection(ENTRIES_COLLECTION, config.embed_dim).await?;
        index.ensure_collection(CONTEXTS_COLLECTION, config.embed_dim).await?;

        Ok(index)
    }

    fn collection_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    async fn ensure_collection(&self, suffix: &str, embed_dim: u64) -> CoreResult<()> {
        let collection = self.collection_name(suffix);
        let exists = self
            .client
            .collection_exists(&collection)
            .await
            .transient_context("failed to check collection existence")?;

        if exists {
            return Ok(());
        }

        info!("creating qdrant collection: {}", collection);
        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&collection)
                    .vectors_config(VectorParamsBuilder::new(embed_dim, Distance::Cosine)),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if CoreError::is_already_exists(&e.to_string()) => {
                debug!("collection {} created concurrently, ignoring", collection);
                Ok(())
            }
            Err(e) => Err(e).transient_context(&format!("failed to create collection {collection}")),
        }
    }

    fn point_id(id: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    async fn upsert(
        &self,
        suffix: &str,
        id: &str,
        vector: &[f32],
        actor_id: &str,
        memory_id: &str,
        payload: Payload,
    ) -> CoreResult<()> {
        let collection = self.collection_name(suffix);

        let mut object = serde_json::Map::new();
        for (k, v) in payload {
            object.insert(k, v);
        }
        object.insert("actor_id".to_string(), serde_json::json!(actor_id));
        object.insert("memory_id".to_string(), serde_json::json!(memory_id));

        let qdrant_payload: QdrantPayload = serde_json::Value::Object(object)
            .try_into()
            .transient_context("failed to build qdrant payload")?;

        let point = PointStruct::new(Self::point_id(id), vector.to_vec(), qdrant_payload);

        match self
            .client
            .upsert_points(UpsertPointsBuilder::new(&collection, vec![point]).wait(true))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
            Err(e) => Err(e).transient_context(&format!("failed to upsert point into {collection}")),
        }
    }

    async fn delete_by_id(&self, suffix: &str, id: &str) -> CoreResult<()> {
        let collection = self.collection_name(suffix);
        match self
            .client
            .delete_points(
                DeletePointsBuilder::new(&collection)
                    .points(vec![PointId::from(Self::point_id(id))])
                    .wait(true),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if CoreError::is_already_exists(&e.to_string()) => Ok(()),
            Err(e) => Err(e).transient_context(&format!("failed to delete point from {collection}")),
        }
    }

    async fn delete_scope(&self, suffix: &str, conditions: Vec<Condition>) -> CoreResult<()> {
        let collection = self.collection_name(suffix);
        let filter = Filter::must(conditions);

        self.client
            .delete_points(DeletePointsBuilder::new(&collection).points(filter).wait(true))
            .await
            .transient_context(&format!("failed to delete scope from {collection}"))?;

        Ok(())
    }

    fn scope_conditions(actor_id: &str, memory_id: &str) -> Vec<Condition> {
        vec![
            Condition::matches("actor_id", actor_id.to_string()),
            Condition::matches("memory_id", memory_id.to_string()),
        ]
    }
}

fn dense_score(raw: f32) -> f32 {
    ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn str_field(payload: &qdrant_client::qdrant::Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn datetime_field(payload: &qdrant_client::qdrant::Payload, key: &str) -> Option<DateTime<Utc>> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl SearchIndex for QdrantIndex {
    async fn upsert_entry(&self, id: &str, vector: &[f32], mut payload: Payload) -> CoreResult<()> {
        let actor_id = payload
            .get("actor_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::permanent("entry payload missing actor_id"))?
            .to_string();
        let memory_id = payload
            .get("memory_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::permanent("entry payload missing memory_id"))?
            .to_string();

        flatten_tags(&mut payload);
        payload.insert("entry_id".to_string(), serde_json::json!(id));

        self.upsert(ENTRIES_COLLECTION, id, vector, &actor_id, &memory_id, payload)
            .await
    }

    async fn upsert_context(&self, id: &str, vector: &[f32], mut payload: Payload) -> CoreResult<()> {
        let actor_id = payload
            .get("actor_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::permanent("context payload missing actor_id"))?
            .to_string();
        let memory_id = payload
            .get("memory_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::permanent("context payload missing memory_id"))?
            .to_string();

        payload.insert("context_id".to_string(), serde_json::json!(id));

        self.upsert(CONTEXTS_COLLECTION, id, vector, &actor_id, &memory_id, payload)
            .await
    }

    async fn delete_entry(&self, _actor_id: &str, id: &str) -> CoreResult<()> {
        self.delete_by_id(ENTRIES_COLLECTION, id).await
    }

    async fn delete_context(&self, _actor_id: &str, id: &str) -> CoreResult<()> {
        self.delete_by_id(CONTEXTS_COLLECTION, id).await
    }

    async fn delete_memory(&self, actor_id: &str, memory_id: &str) -> CoreResult<()> {
        let conditions = Self::scope_conditions(actor_id, memory_id);
        self.delete_scope(ENTRIES_COLLECTION, conditions.clone()).await?;
        self.delete_scope(CONTEXTS_COLLECTION, conditions).await
    }

    async fn delete_vault(&self, actor_id: &str, vault_id: &str) -> CoreResult<()> {
        let conditions = vec![
            Condition::matches("actor_id", actor_id.to_string()),
            Condition::matches("vault_id", vault_id.to_string()),
        ];
        self.delete_scope(ENTRIES_COLLECTION, conditions.clone()).await?;
        self.delete_scope(CONTEXTS_COLLECTION, conditions).await
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

        let collection = self.collection_name(ENTRIES_COLLECTION);
        let filter = Filter::must(Self::scope_conditions(actor_id, memory_id));
        let fetch_limit = (top_k as u64 * OVERFETCH_FACTOR).max(MIN_FETCH);

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&collection, vector.to_vec(), fetch_limit)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .transient_context("failed to search entries collection")?;

        let mut candidates: Vec<(f32, SearchHit)> = Vec::with_capacity(response.result.len());
        let summaries: Vec<String> = response
            .result
            .iter()
            .map(|p| str_field(&p.payload, "summary").unwrap_or_default())
            .collect();
        let corpus = Bm25Corpus::build(summaries.iter().map(String::as_str));

        for point in response.result {
            let Some(entry_id) = str_field(&point.payload, "entry_id") else {
                continue;
            };
            let Some(summary) = str_field(&point.payload, "summary") else {
                continue;
            };
            let Some(creation_time) = datetime_field(&point.payload, "creation_time") else {
                continue;
            };
            let conversation_time = datetime_field(&point.payload, "conversation_time");
            let tags = point
                .payload
                .get("tags")
                .and_then(|v| v.as_str())
                .map(|s| parse_tags(s));
            let raw_entry = if include_raw_entries {
                str_field(&point.payload, "raw_entry")
            } else {
                None
            };

            let dense = dense_score(point.score);
            let lexical = scoring::normalize_lexical(corpus.score(query, &summary));
            let combined = scoring::combine(alpha, lexical, dense);

            candidates.push((
                combined,
                SearchHit {
                    entry_id,
                    summary,
                    raw_entry,
                    tags,
                    creation_time,
                    conversation_time,
                    score: combined,
                },
            ));
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.creation_time.cmp(&a.1.creation_time))
                .then_with(|| a.1.entry_id.cmp(&b.1.entry_id))
        });
        candidates.truncate(top_k as usize);

        Ok(candidates.into_iter().map(|(_, hit)| hit).collect())
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

        let collection = self.collection_name(CONTEXTS_COLLECTION);
        let filter = Filter::must(Self::scope_conditions(actor_id, memory_id));
        let fetch_limit = (top_k as u64 * OVERFETCH_FACTOR).max(MIN_FETCH);

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&collection, vector.to_vec(), fetch_limit)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .transient_context("failed to search contexts collection")?;

        let contents: Vec<String> = response
            .result
            .iter()
            .map(|p| str_field(&p.payload, "content").unwrap_or_default())
            .collect();
        let corpus = Bm25Corpus::build(contents.iter().map(String::as_str));

        let mut candidates: Vec<(f32, ContextHit)> = Vec::with_capacity(response.result.len());
        for point in response.result {
            let Some(context_id) = str_field(&point.payload, "context_id") else {
                continue;
            };
            let Some(content) = str_field(&point.payload, "content") else {
                continue;
            };
            let Some(timestamp) = datetime_field(&point.payload, "timestamp") else {
                continue;
            };

            let dense = dense_score(point.score);
            let lexical = scoring::normalize_lexical(corpus.score(query, &content));
            let combined = scoring::combine(alpha, lexical, dense);

            candidates.push((
                combined,
                ContextHit {
                    context_id,
                    content,
                    timestamp,
                    score: combined,
                },
            ));
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
                .then_with(|| a.1.context_id.cmp(&b.1.context_id))
        });
        candidates.truncate(top_k as usize);

        Ok(candidates.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn latest_context(
        &self,
        actor_id: &str,
        memory_id: &str,
    ) -> CoreResult<Option<(String, DateTime<Utc>)>> {
        let collection = self.collection_name(CONTEXTS_COLLECTION);
        let filter = Filter::must(Self::scope_conditions(actor_id, memory_id));

        let mut latest: Option<(String, DateTime<Utc>)> = None;
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&collection)
                .filter(filter.clone())
                .limit(100)
                .with_payload(true)
                .with_vectors(false);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .transient_context("failed to scroll contexts collection")?;

            if response.result.is_empty() {
                break;
            }

            for point in &response.result {
                let (Some(context_id), Some(timestamp)) = (
                    str_field(&point.payload, "context_id"),
                    datetime_field(&point.payload, "timestamp"),
                ) else {
                    continue;
                };

                let is_newer = match latest.as_ref() {
                    None => true,
                    Some((current_id, current_ts)) => {
                        timestamp > *current_ts
                            || (timestamp == *current_ts && context_id > *current_id)
                    }
                };
                if is_newer {
                    latest = Some((context_id, timestamp));
                }
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(latest)
    }
}

fn parse_tags(raw: &str) -> std::collections::HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Qdrant payload fields are flat; `tags` arrives as a JSON object (the
/// outbox forwards it verbatim). Flatten it to `"k=v,k2=v2"` the way
/// `multi_store`'s `tags.join(",")` stores its tag list, so `parse_tags`
/// can read it back on the search path.
fn flatten_tags(payload: &mut Payload) {
    let Some(tags) = payload.get("tags").and_then(|v| v.as_object()).cloned() else {
        return;
    };

    let flattened = tags
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}={v}")))
        .collect::<Vec<_>>()
        .join(",");

    payload.insert("tags".to_string(), serde_json::json!(flattened));
}
