//! Integrity validation and job rollback
//!
//! Three tiers run on every item: data (fields, lengths, content hash),
//! metadata (canonical round-trip, required target fields) and ledger
//! (address shape, duplicates). An item is valid only when all three pass.

mod integrity;
mod result;
mod rollback;

pub use integrity::{MAX_SOURCE_DESCRIPTION, MAX_SOURCE_NAME, MAX_URI};
pub use result::{IntegrityFlags, Scope, Tier, ValidationResult};
pub use rollback::{RollbackError, RollbackReport};

use crate::config::{MappingConfig, ValidationConfig};
use crate::mapper::truncate_chars;
use crate::models::{
    Job, JobStatus, LogEntry, LogLevel, Mapping, RecordCounts, RecordStatus, SourceRecord,
    Transformation,
};
use crate::store::{self, MigrationStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Validator {
    store: Arc<dyn MigrationStore>,
    rules: ValidationConfig,
    limits: MappingConfig,
}

impl Validator {
    pub fn new(store: Arc<dyn MigrationStore>, rules: ValidationConfig, limits: MappingConfig) -> Self {
        Self { store, rules, limits }
    }

    pub fn rules(&self) -> &ValidationConfig {
        &self.rules
    }

    /// Validate an exported record on its own
    pub async fn validate_record(&self, record: &SourceRecord) -> store::Result<ValidationResult> {
        let started = Instant::now();
        let mut result = ValidationResult::new(Scope::Record);

        integrity::data(record, &mut result);
        integrity::source_metadata(record, &self.rules, &mut result);
        integrity::ledger(record, None, &self.rules, &mut result);
        self.check_duplicate(record, &mut result).await?;

        Ok(result.finish_item(started))
    }

    /// Validate a mapping before minting
    ///
    /// Over-long target fields are truncated in place and logged as
    /// transformations. `recipient` is the resolved target owner; `None`
    /// fails the ledger tier.
    pub async fn validate_mapping(
        &self,
        mapping: &mut Mapping,
        recipient: Option<&str>,
    ) -> store::Result<ValidationResult> {
        let started = Instant::now();
        let mut result = ValidationResult::new(Scope::Mapping);

        self.emergency_truncate(mapping);

        for error in &mapping.errors {
            result.error(Tier::Metadata, error.clone());
        }
        for warning in &mapping.warnings {
            result.warn(Tier::Metadata, warning.clone());
        }

        integrity::data(&mapping.source, &mut result);
        integrity::target_metadata(&mapping.target, &self.rules, &mut result);
        integrity::ledger(&mapping.source, Some(recipient), &self.rules, &mut result);
        self.check_duplicate(&mapping.source, &mut result).await?;

        Ok(result.finish_item(started))
    }

    /// Counter invariants, plus a rollback recommendation above the failure threshold
    pub fn validate_job_progress(&self, job: &Job) -> ValidationResult {
        let started = Instant::now();
        let mut result = ValidationResult::new(Scope::JobProgress);

        result.total = job.total;
        result.validated = job.processed;
        result.success = job.succeeded;
        result.failed = job.failed;

        if job.processed != job.succeeded + job.failed {
            result.error(
                Tier::Data,
                format!(
                    "processed ({}) != succeeded ({}) + failed ({})",
                    job.processed, job.succeeded, job.failed
                ),
            );
        }
        if job.processed > job.total {
            result.error(
                Tier::Data,
                format!("processed ({}) exceeds total ({})", job.processed, job.total),
            );
        }

        let failure_rate = job.failure_rate();
        if failure_rate > self.rules.max_failure_rate {
            result.rollback_required = true;
            result.warn(
                Tier::Data,
                format!(
                    "failure rate {:.1}% exceeds {:.1}%",
                    failure_rate * 100.0,
                    self.rules.max_failure_rate * 100.0
                ),
            );
            result.rollback_steps = vec![
                format!("stop job {}", job.id),
                format!("revert {} completed records to pending", job.succeeded),
                format!("mark job {} cancelled", job.id),
                "fix the failing records and start a new job".to_string(),
            ];
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Revert every completed record of a job to pending, then cancel the job
    ///
    /// Best-effort: a record that fails to revert is reported in
    /// [`RollbackReport::errors`] and the loop moves on.
    pub async fn rollback_job(&self, job_id: Uuid, reason: &str) -> Result<RollbackReport, RollbackError> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(RollbackError::JobNotFound(job_id))?;

        info!(job_id = %job_id, reason = %reason, "Rolling back job");

        let mut records = self.store.list_records(job_id).await?;
        let mut report = RollbackReport {
            job_id,
            reason: reason.to_string(),
            reverted: 0,
            errors: Vec::new(),
        };

        for record in records.iter_mut().filter(|r| r.status == RecordStatus::Completed) {
            let key = record.key();
            let previous = json!({
                "asset_id": record.asset_id,
                "tree_address": record.tree_address,
                "leaf_index": record.leaf_index,
                "signature": record.signature,
            });

            let mut reverted = record.clone();
            reverted.reset_to_pending();

            if let Err(err) = self.store.upsert_record(&reverted).await {
                warn!(job_id = %job_id, record = %key, error = %err, "Failed to revert record");
                report.errors.push(RollbackError::Item {
                    record: key,
                    reason: err.to_string(),
                });
                continue;
            }
            *record = reverted;
            report.reverted += 1;

            let entry = LogEntry::new(job_id, LogLevel::Warn, "record reverted to pending")
                .record(key.clone())
                .details(json!({ "reason": reason, "previous": previous }));
            if let Err(err) = self.store.append_log(&entry).await {
                warn!(job_id = %job_id, record = %key, error = %err, "Failed to log record reversal");
            }
        }

        job.apply_counts(&RecordCounts::tally(records.iter()));
        job.finish(JobStatus::Cancelled, Some(format!("rolled back: {}", reason)));
        self.store.update_job(&job).await?;

        let summary = LogEntry::new(job_id, LogLevel::Warn, "job rolled back").details(json!({
            "reason": reason,
            "reverted": report.reverted,
            "errors": report.errors.len(),
        }));
        self.store.append_log(&summary).await?;

        info!(
            job_id = %job_id,
            reverted = report.reverted,
            errors = report.errors.len(),
            "Rollback finished"
        );
        Ok(report)
    }

    fn emergency_truncate(&self, mapping: &mut Mapping) {
        let limits = [
            ("name", self.limits.max_name_length),
            ("symbol", self.limits.max_symbol_length),
            ("description", self.limits.max_description_length),
        ];
        for (field, max) in limits {
            let value = match field {
                "name" => &mut mapping.target.name,
                "symbol" => &mut mapping.target.symbol,
                _ => &mut mapping.target.description,
            };
            let (truncated, cut) = truncate_chars(value, max);
            if cut {
                let before = std::mem::replace(value, truncated.clone());
                warn!(record = %mapping.source.key(), field, "Emergency truncation applied");
                mapping.record(Transformation::new(
                    field,
                    before,
                    truncated,
                    format!("emergency truncation to {} characters", max),
                ));
            }
        }
    }

    async fn check_duplicate(&self, record: &SourceRecord, result: &mut ValidationResult) -> store::Result<()> {
        if let Some(existing) = self
            .store
            .find_record(&record.source_contract, &record.source_token_id)
            .await?
        {
            if existing.status == RecordStatus::Completed {
                result.warn(
                    Tier::Ledger,
                    format!(
                        "duplicate: {} already migrated by job {}",
                        record.key(),
                        existing.job_id
                    ),
                );
            }
        }
        Ok(())
    }
}
