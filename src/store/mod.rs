//! Persistence interface for jobs, per-token records and the audit log
//!
//! The engine only talks to [`MigrationStore`]. [`MemoryStore`] backs tests
//! and dry runs; `ledger::FjallStore` is the durable implementation.

mod memory;

pub use memory::MemoryStore;

use crate::models::{Job, LogEntry, MigrationRecord, RecordStatus};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("job {0} already exists")]
    JobExists(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Job and record persistence
///
/// Records are unique per (job, contract, token id). Implementations must give
/// per-row atomic writes and be `Send + Sync + 'static` so they can be shared
/// across tasks and the HTTP server.
#[async_trait]
pub trait MigrationStore: Send + Sync + 'static {
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Overwrite an existing job
    ///
    /// Returns `Err(StoreError::JobNotFound)` when the job was never created.
    async fn update_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    /// All jobs, oldest first
    async fn list_jobs(&self) -> Result<Vec<Job>>;

    async fn upsert_record(&self, record: &MigrationRecord) -> Result<()>;

    /// A record for this token from any job, preferring a completed one
    async fn find_record(&self, contract: &str, token_id: &str) -> Result<Option<MigrationRecord>>;

    async fn list_records(&self, job_id: Uuid) -> Result<Vec<MigrationRecord>>;

    /// Records a resumed job still has to process: pending ones plus those
    /// that failed with a retryable error kind
    async fn list_pending_records(&self, job_id: Uuid) -> Result<Vec<MigrationRecord>> {
        Ok(self
            .list_records(job_id)
            .await?
            .into_iter()
            .filter(|r| match r.status {
                RecordStatus::Pending => true,
                RecordStatus::Failed => r.error_kind.is_some_and(|kind| kind.is_retryable()),
                _ => false,
            })
            .collect())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Log entries of a job in insertion order
    async fn list_logs(&self, job_id: Uuid) -> Result<Vec<LogEntry>>;
}

/// Pick the record `find_record` should return among candidates for one token
pub(crate) fn preferred_record(candidates: Vec<MigrationRecord>) -> Option<MigrationRecord> {
    candidates.into_iter().max_by(|a, b| {
        let rank = |r: &MigrationRecord| r.status == RecordStatus::Completed;
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.updated_at.cmp(&b.updated_at))
    })
}
