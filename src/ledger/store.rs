use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Job, LogEntry, MigrationRecord};
use crate::store::{self, MigrationStore, StoreError, preferred_record};

use super::error::{LedgerError, Result};
use super::partitions::{
    META_NEXT_LOG_SEQ, decode_token_index_key, encode_job_key, encode_log_key, encode_log_prefix,
    encode_meta_key, encode_record_key, encode_record_prefix, encode_token_index_key,
    encode_token_index_prefix,
};

/// Fjall-backed persistent storage for jobs, records and the audit log
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    records: PartitionHandle,
    token_index: PartitionHandle,
    logs: PartitionHandle,
    metadata: PartitionHandle,
    next_log_seq: std::sync::Arc<Mutex<u64>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let token_index = keyspace.open_partition("token_index", PartitionCreateOptions::default())?;
        let logs = keyspace.open_partition("logs", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let next_log_seq = match metadata.get(encode_meta_key(META_NEXT_LOG_SEQ))? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| LedgerError::CorruptMetadata(META_NEXT_LOG_SEQ.to_string()))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };

        info!(next_log_seq, "Ledger opened");
        Ok(Self {
            keyspace,
            jobs,
            records,
            token_index,
            logs,
            metadata,
            next_log_seq: std::sync::Arc::new(Mutex::new(next_log_seq)),
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(partition: &PartitionHandle, key: Vec<u8>) -> Result<Option<T>> {
        match partition.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(partition: &PartitionHandle, prefix: Vec<u8>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in partition.prefix(prefix) {
            let (_, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn write_job(&self, job: &Job) -> Result<()> {
        self.jobs.insert(encode_job_key(job.id), serde_json::to_vec(job)?)?;
        debug!(job_id = %job.id, status = ?job.status, "Job written");
        Ok(())
    }

    fn write_record(&self, record: &MigrationRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.records,
            encode_record_key(record.job_id, &record.source_contract, &record.source_token_id),
            value,
        );
        batch.insert(
            &self.token_index,
            encode_token_index_key(&record.source_contract, &record.source_token_id, record.job_id),
            Vec::<u8>::new(),
        );
        batch.commit()?;
        Ok(())
    }

    fn records_for_token(&self, contract: &str, token_id: &str) -> Result<Vec<MigrationRecord>> {
        let mut records = Vec::new();
        for item in self.token_index.prefix(encode_token_index_prefix(contract, token_id)) {
            let (key, _) = item?;
            let Some(job_id) = decode_token_index_key(&key) else {
                continue;
            };
            let record: Option<MigrationRecord> =
                Self::read(&self.records, encode_record_key(job_id, contract, token_id))?;
            records.extend(record);
        }
        Ok(records)
    }

    fn write_log(&self, entry: &LogEntry) -> Result<()> {
        let value = serde_json::to_vec(entry)?;
        let mut next = self.next_log_seq.lock();
        let seq = *next;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.logs, encode_log_key(entry.job_id, seq), value);
        batch.insert(
            &self.metadata,
            encode_meta_key(META_NEXT_LOG_SEQ),
            (seq + 1).to_be_bytes().to_vec(),
        );
        batch.commit()?;

        *next = seq + 1;
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for FjallStore {
    async fn create_job(&self, job: &Job) -> store::Result<()> {
        if self.jobs.contains_key(encode_job_key(job.id)).map_err(LedgerError::from)? {
            return Err(StoreError::JobExists(job.id));
        }
        Ok(self.write_job(job)?)
    }

    async fn update_job(&self, job: &Job) -> store::Result<()> {
        if !self.jobs.contains_key(encode_job_key(job.id)).map_err(LedgerError::from)? {
            return Err(StoreError::JobNotFound(job.id));
        }
        Ok(self.write_job(job)?)
    }

    async fn get_job(&self, id: Uuid) -> store::Result<Option<Job>> {
        Ok(Self::read(&self.jobs, encode_job_key(id))?)
    }

    async fn list_jobs(&self) -> store::Result<Vec<Job>> {
        let mut jobs: Vec<Job> = Self::scan(&self.jobs, b"job:".to_vec())?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn upsert_record(&self, record: &MigrationRecord) -> store::Result<()> {
        Ok(self.write_record(record)?)
    }

    async fn find_record(&self, contract: &str, token_id: &str) -> store::Result<Option<MigrationRecord>> {
        Ok(preferred_record(self.records_for_token(contract, token_id)?))
    }

    async fn list_records(&self, job_id: Uuid) -> store::Result<Vec<MigrationRecord>> {
        Ok(Self::scan(&self.records, encode_record_prefix(job_id))?)
    }

    async fn append_log(&self, entry: &LogEntry) -> store::Result<()> {
        Ok(self.write_log(entry)?)
    }

    async fn list_logs(&self, job_id: Uuid) -> store::Result<Vec<LogEntry>> {
        Ok(Self::scan(&self.logs, encode_log_prefix(job_id))?)
    }
}
