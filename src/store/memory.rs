use super::{MigrationStore, Result, StoreError, preferred_record};
use crate::models::{Job, LogEntry, MigrationRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    jobs: BTreeMap<Uuid, Job>,
    /// (job, "<contract>:<token>") -> record
    records: BTreeMap<(Uuid, String), MigrationRecord>,
    logs: Vec<LogEntry>,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::JobExists(job.id));
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(job.id)),
        }
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.tables.read().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.tables.read().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn upsert_record(&self, record: &MigrationRecord) -> Result<()> {
        self.tables
            .write()
            .records
            .insert((record.job_id, record.key()), record.clone());
        Ok(())
    }

    async fn find_record(&self, contract: &str, token_id: &str) -> Result<Option<MigrationRecord>> {
        let candidates = self
            .tables
            .read()
            .records
            .values()
            .filter(|r| r.source_contract == contract && r.source_token_id == token_id)
            .cloned()
            .collect();
        Ok(preferred_record(candidates))
    }

    async fn list_records(&self, job_id: Uuid) -> Result<Vec<MigrationRecord>> {
        Ok(self
            .tables
            .read()
            .records
            .range((job_id, String::new())..)
            .take_while(|((id, _), _)| *id == job_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.tables.write().logs.push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, job_id: Uuid) -> Result<Vec<LogEntry>> {
        Ok(self
            .tables
            .read()
            .logs
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect())
    }
}
