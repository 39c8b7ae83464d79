use crate::models::{Job, Phase, RecordCounts};
use crate::store::{self, MigrationStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Owns the running job and writes its counters at a fixed item cadence
///
/// Counters are always recomputed from the stored records, never incremented
/// in place, so `processed == succeeded + failed` holds after every write.
pub struct Checkpointer {
    store: Arc<dyn MigrationStore>,
    job: Mutex<Job>,
    every: usize,
    finished: AtomicUsize,
}

impl Checkpointer {
    pub fn new(store: Arc<dyn MigrationStore>, job: Job, every: usize) -> Self {
        Self {
            store,
            job: Mutex::new(job),
            every: every.max(1),
            finished: AtomicUsize::new(0),
        }
    }

    pub async fn snapshot(&self) -> Job {
        self.job.lock().await.clone()
    }

    /// Count one finished item, flushing on every `every`-th
    pub async fn tick(&self) -> store::Result<()> {
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if finished % self.every == 0 {
            self.flush().await?;
        }
        Ok(())
    }

    /// Recompute counters from the stored records and persist the job
    pub async fn flush(&self) -> store::Result<Job> {
        let mut job = self.job.lock().await;
        let records = self.store.list_records(job.id).await?;
        job.apply_counts(&RecordCounts::tally(records.iter()));
        self.store.update_job(&job).await?;

        debug!(
            job_id = %job.id,
            total = job.total,
            processed = job.processed,
            succeeded = job.succeeded,
            failed = job.failed,
            "Checkpoint written"
        );
        Ok(job.clone())
    }

    pub async fn enter(&self, phase: Phase) -> store::Result<()> {
        let mut job = self.job.lock().await;
        job.enter(phase);
        self.store.update_job(&job).await?;
        debug!(job_id = %job.id, phase = %phase, "Phase entered");
        Ok(())
    }
}
