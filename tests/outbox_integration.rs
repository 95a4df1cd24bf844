// tests/outbox_integration.rs
// End-to-end OutboxWorker scenarios against fake collaborators, covering
// spec.md §8 scenarios 1, 2, 3 and 7 through the worker's public poll loop
// rather than `dispatch` directly.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mycelian_memory_core::config::OutboxConfig;
use mycelian_memory_core::embedding::EmbeddingProvider;
use mycelian_memory_core::error::{CoreError, CoreResult};
use mycelian_memory_core::index::{InMemoryIndex, Payload, SearchIndex};
use mycelian_memory_core::outbox::{OutboxJob, OutboxRepository, OutboxWorker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CountingEmbeddings {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbeddings {
    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0])
    }
    fn dimension(&self) -> u64 {
        2
    }
}

#[derive(Clone)]
struct Recorded {
    completed: Vec<i64>,
    dead: Vec<(i64, String)>,
}

/// A fake outbox backed by an in-process queue, exercising the same
/// claim/complete/retry/dead-letter state machine a Postgres-backed
/// repository would, without a live database.
struct FakeOutboxRepository {
    pending: Mutex<Vec<OutboxJob>>,
    outcomes: Mutex<Recorded>,
}

impl FakeOutboxRepository {
    fn new(jobs: Vec<OutboxJob>) -> Self {
        Self {
            pending: Mutex::new(jobs),
            outcomes: Mutex::new(Recorded {
                completed: Vec::new(),
                dead: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl OutboxRepository for FakeOutboxRepository {
    async fn claim_batch(&self, batch_size: u32) -> CoreResult<Vec<OutboxJob>> {
        let mut pending = self.pending.lock().unwrap();
        let now = Utc::now();
        let mut claimed = Vec::new();

        pending.retain(|job| {
            if claimed.len() < batch_size as usize && job.available_at <= now {
                claimed.push(job.clone());
                false
            } else {
                true
            }
        });

        Ok(claimed)
    }

    async fn complete(&self, job_id: i64) -> CoreResult<()> {
        self.outcomes.lock().unwrap().completed.push(job_id);
        Ok(())
    }

    async fn retry_later(&self, job_id: i64, delay: ChronoDuration) -> CoreResult<()> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(job) = pending.iter_mut().find(|j| j.id == job_id) {
            job.attempts += 1;
            job.available_at = Utc::now() + delay;
        }
        Ok(())
    }

    async fn mark_dead(&self, job_id: i64, reason: &str) -> CoreResult<()> {
        self.outcomes
            .lock()
            .unwrap()
            .dead
            .push((job_id, reason.to_string()));
        Ok(())
    }
}

fn job(id: i64, op: &str, aggregate_id: &str, payload: serde_json::Value) -> OutboxJob {
    OutboxJob {
        id,
        op_raw: op.to_string(),
        aggregate_id: aggregate_id.to_string(),
        payload,
        attempts: 0,
        available_at: Utc::now(),
    }
}

fn outbox_config() -> OutboxConfig {
    OutboxConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(20),
        max_attempts: 3,
        backoff_base: Duration::from_millis(5),
        backoff_ceiling: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn empty_preferred_text_is_a_no_op_success() {
    let repo = Arc::new(FakeOutboxRepository::new(vec![job(
        1,
        "upsert_entry",
        "e1",
        serde_json::json!({ "summary": "", "rawEntry": "   \t\n " }),
    )]));
    let embeddings = Arc::new(CountingEmbeddings { calls: AtomicUsize::new(0) });
    let index = Arc::new(InMemoryIndex::new());

    let worker = Arc::new(OutboxWorker::new(repo.clone(), embeddings.clone(), index, outbox_config()));
    let handle = worker.clone().spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.request_stop();
    let _ = handle.await;

    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(repo.outcomes.lock().unwrap().completed, vec![1]);
}

#[tokio::test]
async fn unknown_op_is_marked_dead_without_retry() {
    let repo = Arc::new(FakeOutboxRepository::new(vec![job(
        1,
        "invalid_operation",
        "e1",
        serde_json::json!({}),
    )]));
    let embeddings = Arc::new(CountingEmbeddings { calls: AtomicUsize::new(0) });
    let index = Arc::new(InMemoryIndex::new());

    let worker = Arc::new(OutboxWorker::new(repo.clone(), embeddings, index, outbox_config()));
    let handle = worker.clone().spawn();

    tokio::time::sleep(Duration::from_millis(60)).await;
    worker.request_stop();
    let _ = handle.await;

    let outcomes = repo.outcomes.lock().unwrap();
    assert_eq!(outcomes.dead.len(), 1);
    assert_eq!(outcomes.dead[0].0, 1);
    assert!(outcomes.completed.is_empty());
}

#[tokio::test]
async fn upsert_entry_prefers_summary_and_completes() {
    let payload = serde_json::json!({
        "actorId": "a1", "memoryId": "m1", "vaultId": "v1",
        "summary": "S", "rawEntry": "R",
        "creationTime": Utc::now().to_rfc3339(),
    });
    let repo = Arc::new(FakeOutboxRepository::new(vec![job(1, "upsert_entry", "e1", payload)]));
    let embeddings = Arc::new(CountingEmbeddings { calls: AtomicUsize::new(0) });
    let index = Arc::new(InMemoryIndex::new());

    let worker = Arc::new(OutboxWorker::new(repo.clone(), embeddings.clone(), index.clone(), outbox_config()));
    let handle = worker.clone().spawn();

    tokio::time::sleep(Duration::from_millis(60)).await;
    worker.request_stop();
    let _ = handle.await;

    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 1);
    assert_eq!(repo.outcomes.lock().unwrap().completed, vec![1]);

    let hits = index.search("a1", "m1", "S", &[1.0, 0.0], 5, 0.5, true).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].summary, "S");
}

/// An index whose upsert always reports "already exists"; dispatch must
/// treat it as success, not a retryable failure.
struct AlwaysConflictIndex;

#[async_trait]
impl SearchIndex for AlwaysConflictIndex {
    async fn upsert_entry(&self, _id: &str, _v: &[f32], _p: Payload) -> CoreResult<()> {
        Err(CoreError::transient("object already exists"))
    }
    async fn upsert_context(&self, _id: &str, _v: &[f32], _p: Payload) -> CoreResult<()> {
        Err(CoreError::transient("object already exists"))
    }
    async fn delete_entry(&self, _a: &str, _id: &str) -> CoreResult<()> {
        Ok(())
    }
    async fn delete_context(&self, _a: &str, _id: &str) -> CoreResult<()> {
        Ok(())
    }
    async fn delete_memory(&self, _a: &str, _m: &str) -> CoreResult<()> {
        Ok(())
    }
    async fn delete_vault(&self, _a: &str, _v: &str) -> CoreResult<()> {
        Ok(())
    }
    async fn search(
        &self,
        _a: &str,
        _m: &str,
        _q: &str,
        _v: &[f32],
        _k: u32,
        _alpha: f32,
        _raw: bool,
    ) -> CoreResult<Vec<mycelian_memory_core::model::SearchHit>> {
        Ok(Vec::new())
    }
    async fn search_contexts(
        &self,
        _a: &str,
        _m: &str,
        _q: &str,
        _v: &[f32],
        _k: u32,
        _alpha: f32,
    ) -> CoreResult<Vec<mycelian_memory_core::model::ContextHit>> {
        Ok(Vec::new())
    }
    async fn latest_context(
        &self,
        _a: &str,
        _m: &str,
    ) -> CoreResult<Option<(String, chrono::DateTime<chrono::Utc>)>> {
        Ok(None)
    }
}

#[tokio::test]
async fn already_exists_is_treated_as_success_not_retried() {
    let payload = serde_json::json!({
        "actorId": "a1", "summary": "S", "creationTime": Utc::now().to_rfc3339(),
    });
    let repo = Arc::new(FakeOutboxRepository::new(vec![job(1, "upsert_entry", "e1", payload)]));
    let embeddings = Arc::new(CountingEmbeddings { calls: AtomicUsize::new(0) });
    let index = Arc::new(AlwaysConflictIndex);

    let worker = Arc::new(OutboxWorker::new(repo.clone(), embeddings, index, outbox_config()));
    let handle = worker.clone().spawn();

    tokio::time::sleep(Duration::from_millis(60)).await;
    worker.request_stop();
    let _ = handle.await;

    assert_eq!(repo.outcomes.lock().unwrap().completed, vec![1]);
    assert!(repo.outcomes.lock().unwrap().dead.is_empty());
}
