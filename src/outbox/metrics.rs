// src/outbox/metrics.rs
// Worker metrics, grounded on `tasks::metrics::TaskMetrics`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Default)]
pub struct OutboxMetrics {
    processed: RwLock<HashMap<String, AtomicUsize>>,
    errors: RwLock<HashMap<String, AtomicUsize>>,
    dead_lettered: RwLock<HashMap<String, AtomicUsize>>,
    durations: RwLock<HashMap<String, Vec<Duration>>>,
}

impl OutboxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, op: &str) {
        self.processed
            .write()
            .entry(op.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, op: &str) {
        self.errors
            .write()
            .entry(op.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self, op: &str) {
        self.dead_lettered
            .write()
            .entry(op.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_duration(&self, duration: Duration) {
        self.durations
            .write()
            .entry("batch".to_string())
            .or_insert_with(Vec::new)
            .push(duration);
    }

    /// Logs per-op counters accumulated since the last report and resets
    /// them, the same incremental-report shape as `TaskMetrics::report`.
    pub fn report(&self) {
        let processed = self.processed.read();
        let errors = self.errors.read();
        let dead_lettered = self.dead_lettered.read();

        let mut has_activity = false;

        for (op, count) in processed.iter() {
            let processed_count = count.load(Ordering::Relaxed);
            let error_count = errors.get(op).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
            let dead_count = dead_lettered
                .get(op)
                .map(|c| c.load(Ordering::Relaxed))
                .unwrap_or(0);

            if processed_count > 0 || error_count > 0 || dead_count > 0 {
                info!(
                    "outbox op '{}': processed={}, errors={}, dead_lettered={}",
                    op, processed_count, error_count, dead_count
                );
                has_activity = true;
            }
        }

        if !has_activity {
            info!("outbox worker idle, no jobs processed since last report");
        }

        self.reset_counters();
    }

    fn reset_counters(&self) {
        for (_, count) in self.processed.read().iter() {
            count.store(0, Ordering::Relaxed);
        }
        for (_, count) in self.errors.read().iter() {
            count.store(0, Ordering::Relaxed);
        }
        for (_, count) in self.dead_lettered.read().iter() {
            count.store(0, Ordering::Relaxed);
        }
        self.durations.write().clear();
    }
}
