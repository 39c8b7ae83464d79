//! Per-item pipeline: export -> map -> validate -> mint -> persist

use crate::archive::ExportArchive;
use crate::batch::ItemOutcome;
use crate::config::RecipientConfig;
use crate::error::{ErrorKind, MigrationError, Result};
use crate::export::Exporter;
use crate::mapper::Mapper;
use crate::mint::{MintError, MintRequest, TreeManager};
use crate::models::{
    LogEntry, LogLevel, Mapping, MigrationRecord, Phase, RecordStatus, SourceRecord,
};
use crate::observability::{EngineMetrics, instrumented};
use crate::store::MigrationStore;
use crate::validator::Validator;
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Phases every item goes through, in order
pub const ITEM_PHASES: [Phase; 5] = [
    Phase::Export,
    Phase::Map,
    Phase::Validate,
    Phase::Mint,
    Phase::Persist,
];

/// Attempts at finding a tree with a free leaf before giving up
const TREE_ATTEMPTS: u32 = 3;

/// Idempotency key of a token: hex SHA-256 of `<contract>:<token_id>`
///
/// Stable across jobs, so a re-run of the same contract never mints twice.
pub fn mint_id_for(contract: &str, token_id: &str) -> String {
    hex::encode(Sha256::digest(format!("{}:{}", contract, token_id).as_bytes()))
}

/// One token moving through the pipeline
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub record: MigrationRecord,
    pub source: Option<SourceRecord>,
    pub mapping: Option<Mapping>,
}

impl WorkItem {
    /// Item whose export result is already in hand
    pub fn exported(job_id: Uuid, source: SourceRecord) -> Self {
        let record = MigrationRecord::new(
            job_id,
            source.source_contract.clone(),
            source.source_token_id.clone(),
            source.owner.clone(),
            source.content_hash.clone(),
        );
        Self {
            record,
            source: Some(source),
            mapping: None,
        }
    }

    /// Item resumed from a stored pending record; its source is reloaded
    pub fn resumed(record: MigrationRecord) -> Self {
        Self {
            record,
            source: None,
            mapping: None,
        }
    }
}

/// The components one item passes through
#[derive(bon::Builder)]
pub struct Pipeline {
    exporter: Arc<Exporter>,
    mapper: Arc<Mapper>,
    validator: Arc<Validator>,
    trees: Arc<TreeManager>,
    store: Arc<dyn MigrationStore>,
    archive: Option<ExportArchive>,
    #[builder(default)]
    recipients: RecipientConfig,
    #[builder(default)]
    metrics: Arc<EngineMetrics>,
}

impl Pipeline {
    pub fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Persist a freshly exported token as a pending record and archive its metadata
    pub async fn record_export(&self, job_id: Uuid, source: SourceRecord) -> Result<WorkItem> {
        let item = WorkItem::exported(job_id, source);
        self.store.upsert_record(&item.record).await?;

        if let (Some(archive), Some(source)) = (&self.archive, &item.source) {
            if let Err(err) = archive.archive(source).await {
                warn!(
                    job_id = %job_id,
                    record = %item.record.key(),
                    error = %err,
                    "Failed to archive exported record"
                );
            }
        }

        self.metrics.record_exported();
        Ok(item)
    }

    /// Run every phase; the first failing phase ends the item
    pub async fn run_item(&self, mut item: WorkItem) -> Result<ItemOutcome> {
        for phase in ITEM_PHASES {
            if !self.step(phase, &mut item).await? {
                return Ok(ItemOutcome::Failed);
            }
        }
        Ok(ItemOutcome::Succeeded)
    }

    /// Run one phase for one item
    ///
    /// Returns `Ok(false)` when the item failed and was recorded as failed.
    /// Store errors are not item failures and are returned as `Err`.
    pub async fn step(&self, phase: Phase, item: &mut WorkItem) -> Result<bool> {
        let outcome = match phase {
            Phase::Export => self.load_source(item).await,
            Phase::Map => self.map(item).await,
            Phase::Validate => self.validate(item).await,
            Phase::Mint => self.mint(item).await,
            Phase::Persist => self.persist(item).await,
            Phase::Complete => Ok(()),
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::Store => Err(err),
            Err(err) => {
                self.fail(item, phase, &err).await?;
                Ok(false)
            }
        }
    }

    async fn fail(&self, item: &mut WorkItem, phase: Phase, err: &MigrationError) -> Result<()> {
        let key = item.record.key();
        let job_id = item.record.job_id;
        warn!(job_id = %job_id, record = %key, phase = %phase, error = %err, "Item failed");

        item.record.mark_failed(phase, err.kind(), err.to_string());
        self.store.upsert_record(&item.record).await?;

        let entry = LogEntry::new(job_id, LogLevel::Error, err.to_string())
            .record(key)
            .phase(phase)
            .details(json!({ "kind": err.kind() }));
        self.store.append_log(&entry).await?;

        if phase == Phase::Mint {
            self.metrics.mint_failed();
        }
        Ok(())
    }

    async fn load_source(&self, item: &mut WorkItem) -> Result<()> {
        if item.source.is_some() {
            return Ok(());
        }
        let contract = item.record.source_contract.clone();
        let token_id = item.record.source_token_id.clone();

        let archived = match &self.archive {
            Some(archive) => match archive.load(&contract, &token_id).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(record = %item.record.key(), error = %err, "Archived export unreadable");
                    None
                }
            },
            None => None,
        };

        let source = match archived {
            Some(source) => source,
            None => {
                instrumented(
                    "fetch_token",
                    self.exporter.fetch_token(&contract, &token_id, None),
                )
                .await?
            }
        };

        if source.content_hash != item.record.content_hash {
            warn!(
                job_id = %item.record.job_id,
                record = %item.record.key(),
                "Source changed since export, using current content"
            );
            item.record.content_hash = source.content_hash.clone();
            item.record.owner = source.owner.clone();
        }
        item.source = Some(source);
        Ok(())
    }

    async fn map(&self, item: &mut WorkItem) -> Result<()> {
        let source = item
            .source
            .as_ref()
            .ok_or_else(|| MigrationError::Validation("source record not loaded".into()))?;
        let mapping = self.mapper.map(source);

        if !mapping.is_valid {
            self.metrics.mapping_invalid();
        }
        if !mapping.transformations.is_empty() {
            let entry = LogEntry::new(item.record.job_id, LogLevel::Info, "metadata transformed")
                .record(item.record.key())
                .phase(Phase::Map)
                .details(json!({
                    "template": mapping.template,
                    "transformations": mapping.transformations,
                }));
            self.store.append_log(&entry).await?;
        }

        item.mapping = Some(mapping);
        Ok(())
    }

    async fn validate(&self, item: &mut WorkItem) -> Result<()> {
        let mapping = item
            .mapping
            .as_mut()
            .ok_or_else(|| MigrationError::Validation("item was not mapped".into()))?;

        let recipient = self.recipients.resolve(&mapping.source.owner).map(str::to_string);
        let result = self
            .validator
            .validate_mapping(mapping, recipient.as_deref())
            .await?;

        for warning in &result.warnings {
            let entry = LogEntry::new(item.record.job_id, LogLevel::Warn, warning.clone())
                .record(item.record.key())
                .phase(Phase::Validate);
            self.store.append_log(&entry).await?;
        }

        if !result.is_valid {
            self.metrics.validation_failed();
            return Err(MigrationError::Validation(result.error_summary()));
        }

        item.record.recipient = recipient;
        item.record.target_metadata = Some(mapping.target.clone());
        item.record.phase = Some(Phase::Validate);
        Ok(())
    }

    async fn mint(&self, item: &mut WorkItem) -> Result<()> {
        let record = &mut item.record;
        let mint_id = mint_id_for(&record.source_contract, &record.source_token_id);

        if let Some(prior) = self
            .store
            .find_record(&record.source_contract, &record.source_token_id)
            .await?
        {
            if prior.status == RecordStatus::Completed
                && prior.mint_id.as_deref() == Some(mint_id.as_str())
                && prior.asset_id.is_some()
            {
                info!(
                    job_id = %record.job_id,
                    record = %record.key(),
                    mint_id = %mint_id,
                    prior_job = %prior.job_id,
                    "Reusing prior mint"
                );
                record.mint_id = Some(mint_id);
                record.tree_address = prior.tree_address;
                record.leaf_index = prior.leaf_index;
                record.asset_id = prior.asset_id;
                record.signature = prior.signature;
                record.minted_at = prior.minted_at;
                record.phase = Some(Phase::Mint);
                return Ok(());
            }
        }

        let metadata = record
            .target_metadata
            .clone()
            .ok_or_else(|| MigrationError::Validation("no target metadata".into()))?;
        let recipient = record
            .recipient
            .clone()
            .ok_or_else(|| MigrationError::Validation("no recipient mapped".into()))?;

        let mut attempt = 0;
        let minted = loop {
            attempt += 1;
            let tree = self.trees.acquire(1).await?;
            let request = MintRequest::builder()
                .mint_id(&mint_id)
                .tree_address(&tree.address)
                .recipient(&recipient)
                .metadata(metadata.clone())
                .build();

            match self.trees.mint(request).await {
                Ok(result) => break result,
                Err(MintError::Capacity { tree, .. } | MintError::TreeNotActive { tree, .. })
                    if attempt < TREE_ATTEMPTS =>
                {
                    debug!(mint_id = %mint_id, tree = %tree, attempt, "Tree unavailable, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        };

        record.mint_id = Some(minted.mint_id);
        record.tree_address = Some(minted.tree_address);
        record.leaf_index = minted.leaf_index;
        record.asset_id = minted.asset_id;
        record.signature = minted.signature;
        record.minted_at = Some(minted.minted_at);
        record.phase = Some(Phase::Mint);
        self.metrics.mint_succeeded();
        Ok(())
    }

    async fn persist(&self, item: &mut WorkItem) -> Result<()> {
        let record = &mut item.record;
        record.status = RecordStatus::Completed;
        record.phase = Some(Phase::Persist);
        record.error = None;
        record.error_kind = None;
        record.updated_at = Utc::now();
        self.store.upsert_record(record).await?;

        debug!(job_id = %record.job_id, record = %record.key(), "Item persisted");
        Ok(())
    }
}
