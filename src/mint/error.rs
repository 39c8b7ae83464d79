use super::chain::ChainError;
use super::tree::{TreeParamsError, TreeStatus};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MintError {
    #[error("tree {tree} not found")]
    TreeNotFound { tree: String },

    #[error("tree {tree} is full ({capacity} leaves)")]
    Capacity { tree: String, capacity: u64 },

    #[error("tree {tree} is not active (status {status:?})")]
    TreeNotActive { tree: String, status: TreeStatus },

    #[error("insufficient funds: balance {balance} lamports, estimated cost {required} lamports")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("mint {mint_id} is already in flight")]
    InFlight { mint_id: String },

    #[error("invalid tree parameters: {0}")]
    InvalidParams(#[from] TreeParamsError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

pub type Result<T> = std::result::Result<T, MintError>;
