//! Job orchestration
//!
//! A job runs `export -> map -> validate -> mint -> persist -> complete`.
//! Small jobs move through the phases together, one phase at a time across
//! all items. Jobs larger than one batch are handed to the
//! [`BatchCoordinator`], where each item runs the whole pipeline inside its
//! batch. Either way the job counters are recomputed from the stored records
//! at every checkpoint.

mod checkpoint;
mod pipeline;
#[cfg(test)]
pub(crate) mod testing;

pub use checkpoint::Checkpointer;
pub use pipeline::{ITEM_PHASES, Pipeline, WorkItem, mint_id_for};

use crate::batch::{BatchCoordinator, BatchProgress, ItemOutcome, ItemProcessor};
use crate::config::BatchConfig;
use crate::error::{MigrationError, Result};
use crate::models::{Job, JobStatus, LogEntry, LogLevel, Phase};
use crate::observability::instrumented;
use crate::store::StoreError;
use crate::validator::{RollbackReport, ValidationResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const CANCEL_REASON: &str = "cancelled by operator";

/// What to do when a run does not end cleanly
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Roll back completed items when the job is cancelled
    pub rollback_on_cancel: bool,
    /// Roll back when the failure rate exceeds `validation.max_failure_rate`
    pub rollback_on_failure_rate: bool,
}

#[derive(Debug)]
pub struct JobReport {
    pub job: Job,
    /// Only set for batched runs
    pub progress: Option<BatchProgress>,
    pub validation: ValidationResult,
    pub rollback: Option<RollbackReport>,
}

struct JobProcessor {
    pipeline: Arc<Pipeline>,
    checkpoint: Arc<Checkpointer>,
}

#[async_trait]
impl ItemProcessor for JobProcessor {
    type Item = WorkItem;

    async fn process(&self, item: WorkItem) -> Result<ItemOutcome> {
        let outcome = self.pipeline.run_item(item).await?;
        self.checkpoint.tick().await?;
        Ok(outcome)
    }
}

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    coordinator: BatchCoordinator,
    checkpoint_every: usize,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<Pipeline>, config: &BatchConfig) -> Self {
        Self {
            pipeline,
            coordinator: BatchCoordinator::from_config(config),
            checkpoint_every: config.checkpoint_every,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn create_job(&self, name: impl Into<String>, contracts: Vec<String>) -> Result<Job> {
        if contracts.is_empty() {
            return Err(MigrationError::Validation(
                "a job needs at least one source contract".into(),
            ));
        }

        let job = Job::new(name, contracts, self.coordinator.batch_size());
        self.pipeline.store().create_job(&job).await?;
        self.log(job.id, LogLevel::Info, "job created", json!({"contracts": job.source_addresses}))
            .await?;

        info!(job_id = %job.id, name = %job.name, contracts = job.source_addresses.len(), "Job created");
        Ok(job)
    }

    /// Create a job and run it to the end
    pub async fn migrate(
        &self,
        name: impl Into<String>,
        contracts: Vec<String>,
        cancel: &CancellationToken,
        options: RunOptions,
    ) -> Result<JobReport> {
        let job = self.create_job(name, contracts).await?;
        self.run_job(job.id, cancel, options).await
    }

    /// Run or resume a job
    ///
    /// A job that never got past export is exported again; otherwise only its
    /// pending records and retryable failures are processed. A cancelled run
    /// returns `Ok` with the job in `cancelled`; a job-level failure is
    /// persisted and returned as `Err`.
    pub async fn run_job(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
        options: RunOptions,
    ) -> Result<JobReport> {
        let store = self.pipeline.store();
        let mut job = store
            .get_job(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        if job.status == JobStatus::Completed {
            return Err(MigrationError::Validation(format!("job {} already completed", job_id)));
        }

        job.start();
        job.error_message = None;
        job.completed_at = None;
        store.update_job(&job).await?;
        info!(job_id = %job_id, name = %job.name, resumed_from = ?job.phase, "Job started");

        let checkpoint = Arc::new(Checkpointer::new(store.clone(), job, self.checkpoint_every));
        let outcome = self.execute(&checkpoint, cancel).await;
        self.finish(job_id, &checkpoint, outcome, options).await
    }

    /// Roll back every completed record of a job and cancel it
    pub async fn rollback(&self, job_id: Uuid, reason: &str) -> Result<RollbackReport> {
        let report = instrumented("rollback", self.pipeline.validator().rollback_job(job_id, reason)).await?;
        Ok(report)
    }

    async fn execute(
        &self,
        checkpoint: &Arc<Checkpointer>,
        cancel: &CancellationToken,
    ) -> Result<Option<BatchProgress>> {
        let items = self.collect_items(checkpoint, cancel).await?;
        checkpoint.flush().await?;

        if items.len() <= self.coordinator.batch_size() {
            self.run_phased(items, checkpoint, cancel).await?;
            Ok(None)
        } else {
            self.run_batched(items, checkpoint, cancel).await.map(Some)
        }
    }

    async fn collect_items(
        &self,
        checkpoint: &Checkpointer,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkItem>> {
        let job = checkpoint.snapshot().await;
        let store = self.pipeline.store();

        if job.phase.is_some_and(|phase| phase > Phase::Export) {
            let pending = store.list_pending_records(job.id).await?;
            info!(job_id = %job.id, pending = pending.len(), "Resuming unfinished records");
            return Ok(pending.into_iter().map(WorkItem::resumed).collect());
        }

        checkpoint.enter(Phase::Export).await?;
        let mut items = Vec::new();
        for contract in &job.source_addresses {
            let exported = instrumented(
                "export_contract",
                self.export_contract(job.id, contract, cancel, &mut items),
            )
            .await?;
            self.log(
                job.id,
                LogLevel::Info,
                "contract exported",
                json!({"contract": contract, "records": exported}),
            )
            .await?;
        }
        Ok(items)
    }

    async fn export_contract(
        &self,
        job_id: Uuid,
        contract: &str,
        cancel: &CancellationToken,
        items: &mut Vec<WorkItem>,
    ) -> Result<usize> {
        let mut stream = pin!(self.pipeline.exporter().export(contract));
        let mut exported = 0;
        while let Some(next) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
            items.push(self.pipeline.record_export(job_id, next?).await?);
            exported += 1;
        }
        Ok(exported)
    }

    async fn run_phased(
        &self,
        mut items: Vec<WorkItem>,
        checkpoint: &Checkpointer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for phase in ITEM_PHASES {
            checkpoint.enter(phase).await?;

            let mut survivors = Vec::with_capacity(items.len());
            for mut item in items {
                if cancel.is_cancelled() {
                    return Err(MigrationError::Cancelled);
                }
                let survived = self.pipeline.step(phase, &mut item).await?;
                if !survived || phase == Phase::Persist {
                    checkpoint.tick().await?;
                }
                if survived {
                    survivors.push(item);
                }
            }
            items = survivors;

            let job = checkpoint.flush().await?;
            self.check_counters(&job, phase);
        }
        Ok(())
    }

    async fn run_batched(
        &self,
        items: Vec<WorkItem>,
        checkpoint: &Arc<Checkpointer>,
        cancel: &CancellationToken,
    ) -> Result<BatchProgress> {
        checkpoint.enter(Phase::Mint).await?;

        let processor = Arc::new(JobProcessor {
            pipeline: self.pipeline.clone(),
            checkpoint: checkpoint.clone(),
        });
        let run = self.coordinator.run(items, processor, cancel.clone()).await;

        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        if let Some(report) = run.reports.iter().find(|r| r.error.is_some()) {
            return Err(MigrationError::BatchAborted {
                batch: report.index,
                reason: report.error.clone().unwrap_or_default(),
            });
        }

        checkpoint.enter(Phase::Persist).await?;
        let job = checkpoint.flush().await?;
        self.check_counters(&job, Phase::Persist);
        Ok(run.progress)
    }

    fn check_counters(&self, job: &Job, phase: Phase) {
        let progress = self.pipeline.validator().validate_job_progress(job);
        if !progress.is_valid {
            error!(
                job_id = %job.id,
                phase = %phase,
                errors = %progress.error_summary(),
                "Job counters inconsistent"
            );
        }
    }

    async fn finish(
        &self,
        job_id: Uuid,
        checkpoint: &Checkpointer,
        outcome: Result<Option<BatchProgress>>,
        options: RunOptions,
    ) -> Result<JobReport> {
        let metrics = self.pipeline.metrics();
        let mut job = match checkpoint.flush().await {
            Ok(job) => job,
            Err(err) => {
                error!(job_id = %job_id, error = %err, outcome = ?outcome.as_ref().err(), "Final checkpoint failed");
                metrics.job_failed();
                return Err(err.into());
            }
        };
        let validation = self.pipeline.validator().validate_job_progress(&job);

        match outcome {
            Ok(progress) => {
                if validation.rollback_required {
                    let reason = format!(
                        "failure rate {:.1}% above threshold",
                        job.failure_rate() * 100.0
                    );
                    if options.rollback_on_failure_rate {
                        metrics.job_failed();
                        return self.rolled_back(job_id, &reason, progress, validation).await;
                    }
                    warn!(job_id = %job_id, reason = %reason, "Rollback recommended");
                    self.log(
                        job_id,
                        LogLevel::Warn,
                        "rollback recommended",
                        json!({"reason": reason, "steps": validation.rollback_steps}),
                    )
                    .await?;
                }

                job.enter(Phase::Complete);
                job.finish(JobStatus::Completed, None);
                self.pipeline.store().update_job(&job).await?;
                metrics.job_completed();
                self.log(job_id, LogLevel::Info, "job completed", counts(&job)).await?;

                info!(
                    job_id = %job_id,
                    total = job.total,
                    succeeded = job.succeeded,
                    failed = job.failed,
                    "Job completed"
                );
                Ok(JobReport {
                    job,
                    progress,
                    validation,
                    rollback: None,
                })
            }
            Err(MigrationError::Cancelled) => {
                warn!(job_id = %job_id, phase = ?job.phase, "Job cancelled");
                if options.rollback_on_cancel {
                    return self.rolled_back(job_id, CANCEL_REASON, None, validation).await;
                }

                job.finish(JobStatus::Cancelled, Some(CANCEL_REASON.to_string()));
                self.pipeline.store().update_job(&job).await?;
                self.log(job_id, LogLevel::Warn, "job cancelled", counts(&job)).await?;
                Ok(JobReport {
                    job,
                    progress: None,
                    validation,
                    rollback: None,
                })
            }
            Err(err) => {
                error!(job_id = %job_id, phase = ?job.phase, kind = ?err.kind(), error = %err, "Job failed");
                metrics.job_failed();

                job.finish(JobStatus::Failed, Some(err.to_string()));
                if let Err(store_err) = self.pipeline.store().update_job(&job).await {
                    error!(job_id = %job_id, error = %store_err, "Could not record job failure");
                    return Err(err);
                }
                let entry = LogEntry::new(job_id, LogLevel::Error, err.to_string())
                    .details(json!({"kind": err.kind(), "phase": job.phase}));
                if let Err(store_err) = self.pipeline.store().append_log(&entry).await {
                    error!(job_id = %job_id, error = %store_err, "Could not log job failure");
                }
                Err(err)
            }
        }
    }

    async fn rolled_back(
        &self,
        job_id: Uuid,
        reason: &str,
        progress: Option<BatchProgress>,
        validation: ValidationResult,
    ) -> Result<JobReport> {
        let rollback = self.rollback(job_id, reason).await?;
        let job = self
            .pipeline
            .store()
            .get_job(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        Ok(JobReport {
            job,
            progress,
            validation,
            rollback: Some(rollback),
        })
    }

    async fn log(&self, job_id: Uuid, level: LogLevel, message: &str, details: Value) -> Result<()> {
        let entry = LogEntry::new(job_id, level, message).details(details);
        self.pipeline.store().append_log(&entry).await?;
        Ok(())
    }
}

fn counts(job: &Job) -> Value {
    json!({
        "total": job.total,
        "processed": job.processed,
        "succeeded": job.succeeded,
        "failed": job.failed,
    })
}
