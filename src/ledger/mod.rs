/// Fjall-based durable implementation of the migration store
///
/// Jobs, per-token records and audit log entries live in separate partitions
/// of one embedded LSM keyspace. A `token_index` partition maps each
/// `(contract, token_id)` to the jobs that touched it so duplicate detection
/// does not scan every job.
///
/// ## Usage
///
/// ```rust,ignore
/// use mintbridge::ledger::FjallStore;
///
/// let store = FjallStore::open("data/ledger")?;
/// let job = store.get_job(job_id).await?;
/// ```
pub mod error;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::FjallStore;
