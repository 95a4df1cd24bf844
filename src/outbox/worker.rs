// src/outbox/worker.rs
// The poll loop itself, grounded on `tasks::mod::TaskManager`'s
// `spawn_*` methods: `tokio::spawn` a loop ticking on an interval with
// `MissedTickBehavior::Skip`, processing a batch per tick and recording
// metrics.

use super::{dispatch, Op, OutboxJob, OutboxMetrics, OutboxRepository};
use crate::config::OutboxConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::CoreError;
use crate::index::SearchIndex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct OutboxWorker {
    repository: Arc<dyn OutboxRepository>,
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SearchIndex>,
    config: OutboxConfig,
    metrics: Arc<OutboxMetrics>,
    stop: Arc<AtomicBool>,
}

impl OutboxWorker {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SearchIndex>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            repository,
            embeddings,
            index,
            config,
            metrics: Arc::new(OutboxMetrics::new()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> Arc<OutboxMetrics> {
        self.metrics.clone()
    }

    /// Signals the loop to stop between jobs. An in-flight job completes or
    /// is retried on the next run; nothing is abandoned mid-dispatch.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Spawns the poll loop, ticking at `config.poll_interval` and claiming
    /// up to `config.batch_size` jobs per tick.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "outbox worker started (interval: {:?}, batch_size: {})",
                self.config.poll_interval, self.config.batch_size
            );

            let mut interval = time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                if self.stop.load(Ordering::Relaxed) {
                    info!("outbox worker stopping");
                    break;
                }

                let start = Instant::now();
                match self.run_once().await {
                    Ok(processed) => {
                        if processed > 0 {
                            debug!("outbox batch processed {} jobs in {:?}", processed, start.elapsed());
                        }
                    }
                    Err(e) => {
                        error!("outbox batch claim failed: {}", e);
                    }
                }
                self.metrics.record_batch_duration(start.elapsed());
            }
        })
    }

    /// Claims and processes one batch; returns the number of jobs processed.
    async fn run_once(&self) -> Result<usize, CoreError> {
        let jobs = self.repository.claim_batch(self.config.batch_size).await?;
        let count = jobs.len();

        for job in jobs {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.process_job(job).await;
        }

        Ok(count)
    }

    async fn process_job(&self, job: OutboxJob) {
        let Some(op) = Op::parse(&job.op_raw) else {
            warn!("outbox job {} has unknown op '{}', marking dead", job.id, job.op_raw);
            self.metrics.record_dead_lettered(&job.op_raw);
            if let Err(e) = self
                .repository
                .mark_dead(job.id, &format!("unknown op: {}", job.op_raw))
                .await
            {
                error!("failed to mark job {} dead: {}", job.id, e);
            }
            return;
        };

        let result = dispatch::dispatch(
            op,
            &job.aggregate_id,
            &job.payload,
            self.embeddings.as_ref(),
            self.index.as_ref(),
        )
        .await;

        match result {
            Ok(()) => {
                self.metrics.record_processed(op.as_str());
                if let Err(e) = self.repository.complete(job.id).await {
                    error!("failed to complete job {}: {}", job.id, e);
                }
            }
            Err(CoreError::Permanent(reason)) => {
                warn!("outbox job {} failed permanently: {}", job.id, reason);
                self.metrics.record_dead_lettered(op.as_str());
                if let Err(e) = self.repository.mark_dead(job.id, &reason).await {
                    error!("failed to mark job {} dead: {}", job.id, e);
                }
            }
            Err(e) => {
                self.metrics.record_error(op.as_str());
                let attempts = job.attempts + 1;

                if attempts >= self.config.max_attempts {
                    warn!(
                        "outbox job {} exceeded max attempts ({}), marking dead: {}",
                        job.id, self.config.max_attempts, e
                    );
                    self.metrics.record_dead_lettered(op.as_str());
                    if let Err(mark_err) = self
                        .repository
                        .mark_dead(job.id, &format!("max attempts exceeded: {e}"))
                        .await
                    {
                        error!("failed to mark job {} dead: {}", job.id, mark_err);
                    }
                    return;
                }

                let delay = super::backoff::next_delay(
                    attempts,
                    self.config.backoff_base,
                    self.config.backoff_ceiling,
                );

                debug!("outbox job {} will retry in {:?}: {}", job.id, delay, e);
                if let Err(retry_err) = self.repository.retry_later(job.id, delay).await {
                    error!("failed to reschedule job {}: {}", job.id, retry_err);
                }
            }
        }
    }
}
