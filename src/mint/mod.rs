//! Merkle tree capacity and compressed NFT minting
//!
//! Tree lifecycle: `creating -> active -> {full, disabled, error}`.
//! Mint lifecycle: `pending -> minting -> {success -> confirmed, failed}`,
//! keyed by a caller-supplied `mint_id` so retries never mint twice.

mod chain;
mod error;
mod manager;
mod tree;

pub use chain::{
    ChainError, MintMode, MintReceipt, RpcChain, SimulatedChain, TargetChain, TreeCreation,
};
pub use error::{MintError, Result};
pub use manager::{MintRequest, MintResult, MintStatus, TreeManager};
pub use tree::{Tree, TreeCost, TreeParams, TreeParamsError, TreeStatus};
