// src/search/mod.rs
//! SearchService: the stateless request handler from spec.md §4.4.
//! Grounded on `memory::features::recall_engine::hybrid_search::HybridSearch`
//! for the fan-out-then-assemble shape, generalized to the full 6-step
//! algorithm (validate, authenticate, embed once, conditional entry search,
//! always context search + latest-context, assemble).

pub mod request;
pub mod response;

use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, CoreResult};
use crate::index::SearchIndex;
use request::{SearchRequest, ValidatedSearchRequest};
use response::{ContextResult, EntryResult, SearchResponse};
use std::sync::Arc;
use tracing::{debug, warn};

/// Derives an `actorId` from a bearer token. A stub/test collaborator ships
/// with this core; real IdP integration is out of scope (spec.md §1).
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> CoreResult<String>;
}

pub struct SearchService {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SearchIndex>,
    authenticator: Arc<dyn Authenticator>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SearchIndex>,
        authenticator: Arc<dyn Authenticator>,
        config: SearchConfig,
    ) -> CoreResult<Self> {
        config
            .validate()
            .map_err(|e| CoreError::permanent(format!("invalid search config: {e}")))?;

        Ok(Self {
            embeddings,
            index,
            authenticator,
            config,
        })
    }

    pub async fn search(&self, token: &str, request: SearchRequest) -> CoreResult<SearchResponse> {
        let validated = request.validate(&self.config)?;
        let actor_id = self.authenticator.authenticate(token).await?;

        self.search_as(&actor_id, validated).await
    }

    /// The validated-request half of the algorithm, split out so tests can
    /// drive it without a real `Authenticator`.
    async fn search_as(
        &self,
        actor_id: &str,
        request: ValidatedSearchRequest,
    ) -> CoreResult<SearchResponse> {
        let vector = self.embeddings.embed(&request.query).await.map_err(|e| {
            warn!("embedding failed for search request: {}", e);
            CoreError::transient("embedding service unavailable")
        })?;

        let entries = if request.top_ke > 0 {
            self.index
                .search(
                    actor_id,
                    &request.memory_id,
                    &request.query,
                    &vector,
                    request.top_ke,
                    self.config.alpha,
                    request.include_raw_entries,
                )
                .await
                .map_err(|e| {
                    warn!("entry search failed: {}", e);
                    CoreError::transient("search service unavailable")
                })?
        } else {
            Vec::new()
        };

        let (latest, contexts) = tokio::try_join!(
            self.latest_context(actor_id, &request.memory_id),
            self.search_contexts(actor_id, &request, &vector),
        )?;

        let entries: Vec<EntryResult> = entries
            .into_iter()
            .map(|hit| EntryResult {
                entry_id: hit.entry_id,
                summary: hit.summary,
                raw_entry: hit.raw_entry,
                tags: hit.tags,
                creation_time: hit.creation_time,
                conversation_time: hit.conversation_time,
                score: hit.score,
            })
            .collect();

        let contexts: Vec<ContextResult> = contexts
            .into_iter()
            .map(|hit| ContextResult {
                context: hit.content,
                timestamp: hit.timestamp,
                score: hit.score,
            })
            .collect();

        debug!(
            "search for memory {} returned {} entries, {} contexts",
            request.memory_id,
            entries.len(),
            contexts.len()
        );

        Ok(SearchResponse {
            count: entries.len(),
            entries,
            latest_context: latest.as_ref().map(|(content, _)| content.clone()),
            latest_context_timestamp: latest.map(|(_, ts)| ts),
            contexts,
        })
    }

    async fn latest_context(
        &self,
        actor_id: &str,
        memory_id: &str,
    ) -> CoreResult<Option<(String, chrono::DateTime<chrono::Utc>)>> {
        self.index.latest_context(actor_id, memory_id).await.map_err(|e| {
            warn!("latest context lookup failed: {}", e);
            CoreError::transient("latest context unavailable")
        })
    }

    async fn search_contexts(
        &self,
        actor_id: &str,
        request: &ValidatedSearchRequest,
        vector: &[f32],
    ) -> CoreResult<Vec<crate::model::ContextHit>> {
        self.index
            .search_contexts(
                actor_id,
                &request.memory_id,
                &request.query,
                vector,
                request.top_kc,
                self.config.alpha,
            )
            .await
            .map_err(|e| {
                warn!("context search failed: {}", e);
                CoreError::transient("context search unavailable")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use chrono::Utc;

    struct FakeEmbeddings;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FakeEmbeddings {
        async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn dimension(&self) -> u64 {
            2
        }
    }

    struct FakeAuth;

    #[async_trait::async_trait]
    impl Authenticator for FakeAuth {
        async fn authenticate(&self, token: &str) -> CoreResult<String> {
            if token.is_empty() {
                return Err(CoreError::unauthorized("missing token"));
            }
            Ok(format!("actor-{token}"))
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            alpha: 0.5,
            default_top_ke: 5,
            min_top_ke: 0,
            max_top_ke: 25,
            default_top_kc: 2,
            min_top_kc: 1,
            max_top_kc: 10,
        }
    }

    fn service(index: Arc<InMemoryIndex>) -> SearchService {
        SearchService::new(Arc::new(FakeEmbeddings), index, Arc::new(FakeAuth), config()).unwrap()
    }

    fn request(memory_id: &str, query: &str, top_ke: Option<u32>, top_kc: Option<u32>) -> SearchRequest {
        SearchRequest {
            memory_id: memory_id.to_string(),
            query: query.to_string(),
            top_ke,
            top_kc,
            include_raw_entries: None,
        }
    }

    #[tokio::test]
    async fn out_of_range_top_ke_is_rejected_before_any_downstream_call() {
        let index = Arc::new(InMemoryIndex::new());
        let svc = service(index);

        let result = svc.search("tok", request("m1", "q", Some(26), None)).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn top_ke_zero_yields_empty_entries_but_populates_contexts() {
        let index = Arc::new(InMemoryIndex::new());
        let mut payload = crate::index::Payload::new();
        payload.insert("actor_id".into(), serde_json::json!("actor-tok"));
        payload.insert("memory_id".into(), serde_json::json!("m1"));
        payload.insert("content".into(), serde_json::json!("hello context"));
        payload.insert("timestamp".into(), serde_json::json!(Utc::now().to_rfc3339()));
        index.upsert_context("c1", &[1.0, 0.0], payload).await.unwrap();

        let svc = service(index);
        let response = svc
            .search("tok", request("m1", "hi", Some(0), Some(1)))
            .await
            .unwrap();

        assert_eq!(response.count, 0);
        assert!(response.entries.is_empty());
        assert_eq!(response.contexts.len(), 1);
    }

    #[tokio::test]
    async fn defaults_are_applied_and_response_shape_is_complete() {
        let index = Arc::new(InMemoryIndex::new());
        let svc = service(index);

        let response = svc
            .search("tok", request("m1", "  hello  ", None, None))
            .await
            .unwrap();

        assert_eq!(response.count, 0);
        assert!(response.latest_context.is_none());
        assert!(response.latest_context_timestamp.is_none());
        assert!(response.contexts.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_token_is_rejected() {
        let index = Arc::new(InMemoryIndex::new());
        let svc = service(index);

        let result = svc.search("", request("m1", "q", None, None)).await;
        assert!(matches!(result, Err(CoreError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn latest_context_matches_greatest_timestamp_shard() {
        let index = Arc::new(InMemoryIndex::new());
        let now = Utc::now();

        let mut older = crate::index::Payload::new();
        older.insert("actor_id".into(), serde_json::json!("actor-tok"));
        older.insert("memory_id".into(), serde_json::json!("m1"));
        older.insert("content".into(), serde_json::json!("older shard"));
        older.insert(
            "timestamp".into(),
            serde_json::json!((now - chrono::Duration::hours(1)).to_rfc3339()),
        );
        index.upsert_context("older", &[1.0, 0.0], older).await.unwrap();

        let mut newer = crate::index::Payload::new();
        newer.insert("actor_id".into(), serde_json::json!("actor-tok"));
        newer.insert("memory_id".into(), serde_json::json!("m1"));
        newer.insert("content".into(), serde_json::json!("newer shard"));
        newer.insert("timestamp".into(), serde_json::json!(now.to_rfc3339()));
        index.upsert_context("newer", &[1.0, 0.0], newer).await.unwrap();

        let svc = service(index);
        let response = svc.search("tok", request("m1", "shard", None, None)).await.unwrap();

        assert_eq!(response.latest_context, Some("newer shard".to_string()));
    }
}
