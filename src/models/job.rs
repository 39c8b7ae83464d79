use super::metadata::TargetMetadata;
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Pipeline phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Export,
    Map,
    Validate,
    Mint,
    Persist,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Export => "export",
            Phase::Map => "map",
            Phase::Validate => "validate",
            Phase::Mint => "mint",
            Phase::Persist => "persist",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A migration job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub source_addresses: Vec<String>,
    pub batch_size: usize,
    pub status: JobStatus,
    pub phase: Option<Phase>,
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, source_addresses: Vec<String>, batch_size: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            source_addresses,
            batch_size,
            status: JobStatus::Created,
            phase: None,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Overwrite the counters from item-level results
    pub fn apply_counts(&mut self, counts: &RecordCounts) {
        self.total = counts.total;
        self.succeeded = counts.completed;
        self.failed = counts.failed;
        self.processed = counts.completed + counts.failed;
        self.updated_at = Utc::now();
    }

    /// `processed == succeeded + failed` and `processed <= total`
    pub fn counters_consistent(&self) -> bool {
        self.processed == self.succeeded + self.failed && self.processed <= self.total
    }

    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }

    pub fn start(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = Some(phase);
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, status: JobStatus, error_message: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Per-token migration state, one per (contract, token id) within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub source_contract: String,
    pub source_token_id: String,
    pub owner: String,
    pub content_hash: String,
    pub status: RecordStatus,
    /// Last phase reached, or the phase that failed
    pub phase: Option<Phase>,
    pub recipient: Option<String>,
    pub mint_id: Option<String>,
    pub tree_address: Option<String>,
    pub leaf_index: Option<u64>,
    pub asset_id: Option<String>,
    pub signature: Option<String>,
    pub minted_at: Option<DateTime<Utc>>,
    pub target_metadata: Option<TargetMetadata>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(
        job_id: Uuid,
        source_contract: impl Into<String>,
        source_token_id: impl Into<String>,
        owner: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            source_contract: source_contract.into(),
            source_token_id: source_token_id.into(),
            owner: owner.into(),
            content_hash: content_hash.into(),
            status: RecordStatus::Pending,
            phase: None,
            recipient: None,
            mint_id: None,
            tree_address: None,
            leaf_index: None,
            asset_id: None,
            signature: None,
            minted_at: None,
            target_metadata: None,
            error: None,
            error_kind: None,
            updated_at: Utc::now(),
        }
    }

    /// `<contract>:<token_id>`
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_contract, self.source_token_id)
    }

    pub fn mark_failed(&mut self, phase: Phase, kind: ErrorKind, error: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.phase = Some(phase);
        self.error_kind = Some(kind);
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Back to pending with every minted identifier cleared
    pub fn reset_to_pending(&mut self) {
        self.status = RecordStatus::Pending;
        self.phase = None;
        self.mint_id = None;
        self.tree_address = None;
        self.leaf_index = None;
        self.asset_id = None;
        self.signature = None;
        self.minted_at = None;
        self.error = None;
        self.error_kind = None;
        self.updated_at = Utc::now();
    }
}

/// Record tallies for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl RecordCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a MigrationRecord>) -> Self {
        let mut counts = RecordCounts::default();
        for record in records {
            counts.total += 1;
            match record.status {
                RecordStatus::Pending => counts.pending += 1,
                RecordStatus::Processing => counts.processing += 1,
                RecordStatus::Completed => counts.completed += 1,
                RecordStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Persisted audit line for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub record: Option<String>,
    pub phase: Option<Phase>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(job_id: Uuid, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            record: None,
            phase: None,
            level,
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
