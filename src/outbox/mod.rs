// src/outbox/mod.rs
//! The transactional outbox: the primary store writes a row here in the same
//! transaction as the business write, and a worker drains it into the
//! search index (spec.md §4.3). No direct index writes happen outside this
//! path — the same "one path in" discipline the teacher enforces for
//! `MemoryStore` writes.

mod backoff;
pub mod dispatch;
mod metrics;
mod postgres;
mod worker;

pub use metrics::OutboxMetrics;
pub use postgres::PostgresOutboxRepository;
pub use worker::OutboxWorker;

use crate::error::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The operation an outbox row asks the worker to perform. Untagged ops (a
/// value that doesn't parse into one of these) are a permanent failure, per
/// spec.md §4.3 edge cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    UpsertEntry,
    UpsertContext,
    DeleteEntry,
    DeleteContext,
    DeleteMemory,
    DeleteVault,
}

impl Op {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upsert_entry" => Some(Self::UpsertEntry),
            "upsert_context" => Some(Self::UpsertContext),
            "delete_entry" => Some(Self::DeleteEntry),
            "delete_context" => Some(Self::DeleteContext),
            "delete_memory" => Some(Self::DeleteMemory),
            "delete_vault" => Some(Self::DeleteVault),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpsertEntry => "upsert_entry",
            Self::UpsertContext => "upsert_context",
            Self::DeleteEntry => "delete_entry",
            Self::DeleteContext => "delete_context",
            Self::DeleteMemory => "delete_memory",
            Self::DeleteVault => "delete_vault",
        }
    }
}

/// A durable work item claimed from the outbox table. `payload` carries
/// whatever fields the op needs (entry/context fields for upserts,
/// actor/memory/vault ids for deletes); `dispatch` interprets it per-op.
#[derive(Debug, Clone)]
pub struct OutboxJob {
    pub id: i64,
    pub op_raw: String,
    /// The entry/context id for upserts and per-id deletes, or the
    /// memory/vault id for sweeping deletes (spec.md §3 `OutboxJob`).
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub available_at: DateTime<Utc>,
}

/// Durable queue storage. Implementations must make `claim_batch` race-safe
/// across concurrently-running workers (spec.md §4.3: "atomically claim...
/// race-safe across workers").
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Atomically claims up to `batch_size` jobs whose `available_at` has
    /// passed, marking them in-flight so no other worker claims them
    /// concurrently.
    async fn claim_batch(&self, batch_size: u32) -> CoreResult<Vec<OutboxJob>>;

    /// Deletes a job that dispatched successfully.
    async fn complete(&self, job_id: i64) -> CoreResult<()>;

    /// Reschedules a job for retry after `delay`, incrementing its attempt
    /// counter.
    async fn retry_later(&self, job_id: i64, delay: chrono::Duration) -> CoreResult<()>;

    /// Marks a job permanently failed; it is no longer claimed.
    async fn mark_dead(&self, job_id: i64, reason: &str) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_parse_round_trips_known_values() {
        for op in [
            Op::UpsertEntry,
            Op::UpsertContext,
            Op::DeleteEntry,
            Op::DeleteContext,
            Op::DeleteMemory,
            Op::DeleteVault,
        ] {
            assert_eq!(Op::parse(op.as_str()), Some(op));
        }
    }

    #[test]
    fn op_parse_rejects_unknown_values() {
        assert_eq!(Op::parse("frobnicate"), None);
        assert_eq!(Op::parse(""), None);
    }
}
