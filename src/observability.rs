//! Engine metrics and operation timing

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters owned by one engine instance; safe to share across tasks
#[derive(Debug, Default)]
pub struct EngineMetrics {
    records_exported: AtomicU64,
    mappings_invalid: AtomicU64,
    validations_failed: AtomicU64,
    mints_succeeded: AtomicU64,
    mints_failed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        pub fn $name(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(counter = stringify!($field), "Metric incremented");
        }
    };
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_exported, records_exported);
    counter!(mapping_invalid, mappings_invalid);
    counter!(validation_failed, validations_failed);
    counter!(mint_succeeded, mints_succeeded);
    counter!(mint_failed, mints_failed);
    counter!(job_completed, jobs_completed);
    counter!(job_failed, jobs_failed);

    /// Current values; `failovers` is left at zero for the engine to fill from its clients
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_exported: self.records_exported.load(Ordering::Relaxed),
            mappings_invalid: self.mappings_invalid.load(Ordering::Relaxed),
            validations_failed: self.validations_failed.load(Ordering::Relaxed),
            mints_succeeded: self.mints_succeeded.load(Ordering::Relaxed),
            mints_failed: self.mints_failed.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            failovers: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_exported: u64,
    pub mappings_invalid: u64,
    pub validations_failed: u64,
    pub mints_succeeded: u64,
    pub mints_failed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub failovers: u64,
}

/// Run `future`, emitting start, success and failure events with timing
pub async fn instrumented<T, E, F>(operation: &str, future: F) -> Result<T, E>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    tracing::debug!(operation, "Operation started");

    let result = future.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => tracing::info!(operation, elapsed_ms, "Operation succeeded"),
        Err(error) => tracing::warn!(operation, elapsed_ms, error = %error, "Operation failed"),
    }
    result
}
