// src/outbox/postgres.rs
// Postgres-backed OutboxRepository. The teacher's equivalent tables
// (`memory::storage::sqlite::core`) live on SQLite, which has no
// `SKIP LOCKED`; spec.md §4.3 requires race-safe batch claiming across
// concurrent workers, so this repository targets Postgres instead while
// keeping the same `sqlx` query style (raw `sqlx::query`/`query_as`, bound
// parameters, no compile-time-checked `query!` macro).

use super::{OutboxJob, OutboxRepository};
use crate::error::{CoreResult, IntoCoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};

pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the outbox table if it doesn't already exist. Called once at
    /// startup; production deployments would normally run this as a
    /// migration instead.
    pub async fn ensure_schema(&self) -> CoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox_jobs (
                id BIGSERIAL PRIMARY KEY,
                op TEXT NOT NULL,
                aggregate_id TEXT NOT NULL,
                payload JSONB NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                available_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                claimed_at TIMESTAMPTZ,
                dead BOOLEAN NOT NULL DEFAULT false,
                dead_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .transient_context("failed to create outbox_jobs table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS outbox_jobs_available_idx
                ON outbox_jobs (available_at)
                WHERE NOT dead
            "#,
        )
        .execute(&self.pool)
        .await
        .transient_context("failed to create outbox_jobs index")?;

        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn claim_batch(&self, batch_size: u32) -> CoreResult<Vec<OutboxJob>> {
        let rows = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET claimed_at = now()
            WHERE id IN (
                SELECT id FROM outbox_jobs
                WHERE NOT dead AND available_at <= now()
                ORDER BY available_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, op, aggregate_id, payload, attempts, available_at
            "#,
        )
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await
        .transient_context("failed to claim outbox batch")?;

        let jobs = rows
            .into_iter()
            .map(|row| OutboxJob {
                id: row.get::<i64, _>("id"),
                op_raw: row.get::<String, _>("op"),
                aggregate_id: row.get::<String, _>("aggregate_id"),
                payload: row.get::<serde_json::Value, _>("payload"),
                attempts: row.get::<i32, _>("attempts") as u32,
                available_at: row.get::<DateTime<Utc>, _>("available_at"),
            })
            .collect();

        Ok(jobs)
    }

    async fn complete(&self, job_id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM outbox_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .transient_context("failed to delete completed outbox job")?;

        Ok(())
    }

    async fn retry_later(&self, job_id: i64, delay: ChronoDuration) -> CoreResult<()> {
        let next_available = Utc::now() + delay;

        sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET attempts = attempts + 1,
                available_at = $2,
                claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(next_available)
        .execute(&self.pool)
        .await
        .transient_context("failed to reschedule outbox job")?;

        Ok(())
    }

    async fn mark_dead(&self, job_id: i64, reason: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET dead = true, dead_reason = $2, claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .transient_context("failed to mark outbox job dead")?;

        Ok(())
    }
}
