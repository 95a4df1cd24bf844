// tests/search_integration.rs
// End-to-end SearchService scenarios against the in-memory index fake,
// covering spec.md §8's concrete scenarios 4-6 through the public API
// rather than through SearchService's internal test module.

use chrono::Utc;
use mycelian_memory_core::config::SearchConfig;
use mycelian_memory_core::error::CoreError;
use mycelian_memory_core::index::{InMemoryIndex, Payload, SearchIndex};
use mycelian_memory_core::search::request::SearchRequest;
use mycelian_memory_core::search::{Authenticator, SearchService};
use std::sync::Arc;

struct FakeEmbeddings;

#[async_trait::async_trait]
impl mycelian_memory_core::embedding::EmbeddingProvider for FakeEmbeddings {
    async fn embed(&self, _text: &str) -> mycelian_memory_core::error::CoreResult<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
    fn dimension(&self) -> u64 {
        2
    }
}

struct FixedActorAuth;

#[async_trait::async_trait]
impl Authenticator for FixedActorAuth {
    async fn authenticate(&self, token: &str) -> mycelian_memory_core::error::CoreResult<String> {
        if token.is_empty() {
            return Err(CoreError::unauthorized("missing bearer token"));
        }
        Ok("actor-1".to_string())
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

fn entry_payload(actor: &str, memory: &str, summary: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("actor_id".into(), serde_json::json!(actor));
    p.insert("memory_id".into(), serde_json::json!(memory));
    p.insert("summary".into(), serde_json::json!(summary));
    p.insert("creation_time".into(), serde_json::json!(Utc::now().to_rfc3339()));
    p
}

fn context_payload(actor: &str, memory: &str, content: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("actor_id".into(), serde_json::json!(actor));
    p.insert("memory_id".into(), serde_json::json!(memory));
    p.insert("content".into(), serde_json::json!(content));
    p.insert("timestamp".into(), serde_json::json!(Utc::now().to_rfc3339()));
    p
}

#[tokio::test]
async fn defaults_produce_a_complete_response_with_one_embed_call() {
    let index = Arc::new(InMemoryIndex::new());
    index
        .upsert_entry("e1", &[1.0, 0.0], entry_payload("actor-1", "m1", "hello world"))
        .await
        .unwrap();

    let service = SearchService::new(Arc::new(FakeEmbeddings), index, Arc::new(FixedActorAuth), config()).unwrap();

    let request = SearchRequest {
        memory_id: "m1".to_string(),
        query: "  hello  ".to_string(),
        top_ke: None,
        top_kc: None,
        include_raw_entries: None,
    };

    let response = service.search("tok", request).await.unwrap();

    assert_eq!(response.count, response.entries.len());
    assert!(response.contexts.len() <= 2);
}

#[tokio::test]
async fn context_only_search_skips_entry_search_and_caps_contexts() {
    let index = Arc::new(InMemoryIndex::new());
    index
        .upsert_entry("e1", &[1.0, 0.0], entry_payload("actor-1", "m1", "should not appear"))
        .await
        .unwrap();
    index
        .upsert_context("c1", &[1.0, 0.0], context_payload("actor-1", "m1", "shard one"))
        .await
        .unwrap();
    index
        .upsert_context("c2", &[1.0, 0.0], context_payload("actor-1", "m1", "shard two"))
        .await
        .unwrap();

    let service = SearchService::new(Arc::new(FakeEmbeddings), index, Arc::new(FixedActorAuth), config()).unwrap();

    let request = SearchRequest {
        memory_id: "m1".to_string(),
        query: "hi".to_string(),
        top_ke: Some(0),
        top_kc: Some(1),
        include_raw_entries: None,
    };

    let response = service.search("tok", request).await.unwrap();

    assert_eq!(response.count, 0);
    assert!(response.entries.is_empty());
    assert_eq!(response.contexts.len(), 1);
}

#[tokio::test]
async fn top_ke_out_of_range_is_rejected_before_touching_the_index() {
    let index = Arc::new(InMemoryIndex::new());
    let service = SearchService::new(Arc::new(FakeEmbeddings), index, Arc::new(FixedActorAuth), config()).unwrap();

    let request = SearchRequest {
        memory_id: "m1".to_string(),
        query: "q".to_string(),
        top_ke: Some(26),
        top_kc: None,
        include_raw_entries: None,
    };

    let result = service.search("tok", request).await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn entries_are_scoped_to_the_authenticated_actor() {
    let index = Arc::new(InMemoryIndex::new());
    index
        .upsert_entry("other-actor-entry", &[1.0, 0.0], entry_payload("someone-else", "m1", "hello"))
        .await
        .unwrap();

    let service = SearchService::new(Arc::new(FakeEmbeddings), index, Arc::new(FixedActorAuth), config()).unwrap();

    let request = SearchRequest {
        memory_id: "m1".to_string(),
        query: "hello".to_string(),
        top_ke: None,
        top_kc: None,
        include_raw_entries: None,
    };

    let response = service.search("tok", request).await.unwrap();
    assert!(response.entries.is_empty());
}
