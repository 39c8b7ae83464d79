//! Crate-level error taxonomy
//!
//! Component errors convert into [`MigrationError`]; item failures are stored
//! with the matching [`ErrorKind`].

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::mint::{ChainError, MintError};
use crate::rpc::RpcError;
use crate::store::StoreError;
use crate::validator::RollbackError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    ContractQuery,
    Validation,
    InsufficientFunds,
    Mint,
    Rollback,
    Store,
    Batch,
    Config,
    Cancelled,
}

impl ErrorKind {
    /// Failures a later run may get past without the input changing
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::InsufficientFunds | ErrorKind::Mint | ErrorKind::Cancelled
        )
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("network error: {0}")]
    Network(RpcError),

    #[error("contract query failed: {0}")]
    ContractQuery(ExportError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient funds: balance {balance} lamports, required {required} lamports")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("mint failed: {0}")]
    Mint(MintError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("batch {batch} aborted: {reason}")]
    BatchAborted { batch: usize, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("job cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::Network(_) => ErrorKind::Network,
            MigrationError::ContractQuery(_) => ErrorKind::ContractQuery,
            MigrationError::Validation(_) => ErrorKind::Validation,
            MigrationError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            MigrationError::Mint(_) => ErrorKind::Mint,
            MigrationError::Rollback(_) => ErrorKind::Rollback,
            MigrationError::Store(_) => ErrorKind::Store,
            MigrationError::BatchAborted { .. } => ErrorKind::Batch,
            MigrationError::Config(_) => ErrorKind::Config,
            MigrationError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<RpcError> for MigrationError {
    fn from(err: RpcError) -> Self {
        MigrationError::Network(err)
    }
}

impl From<ExportError> for MigrationError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Rpc(rpc) if rpc.is_retryable() => MigrationError::Network(rpc),
            other => MigrationError::ContractQuery(other),
        }
    }
}

impl From<MintError> for MigrationError {
    fn from(err: MintError) -> Self {
        match err {
            MintError::InsufficientFunds { balance, required } => {
                MigrationError::InsufficientFunds { balance, required }
            }
            MintError::Chain(ChainError::Rpc(rpc)) if rpc.is_retryable() => {
                MigrationError::Network(rpc)
            }
            other => MigrationError::Mint(other),
        }
    }
}
