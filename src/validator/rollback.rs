use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("cannot roll back job {0}: not found")]
    JobNotFound(Uuid),

    #[error("failed to revert record {record}: {reason}")]
    Item { record: String, reason: String },

    #[error("rollback store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a best-effort job rollback
#[derive(Debug)]
pub struct RollbackReport {
    pub job_id: Uuid,
    pub reason: String,
    /// Records moved from completed back to pending
    pub reverted: u64,
    /// Per-record failures; the loop continues past each one
    pub errors: Vec<RollbackError>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
