//! Target chain backends
//!
//! [`RpcChain`] talks to a signing relay over the target endpoint pool.
//! [`SimulatedChain`] keeps everything in memory and marks its output as simulated.
//! The engine picks one explicitly from [`MintMode`]; nothing falls back from one to the other.

use super::tree::TreeParams;
use crate::models::TargetMetadata;
use crate::rpc::{ResilientClient, RpcError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MintMode {
    Live,
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("unexpected {operation} response: {reason}")]
    UnexpectedResponse {
        operation: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeCreation {
    pub address: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub signature: String,
    pub asset_id: String,
}

#[async_trait]
pub trait TargetChain: Send + Sync {
    fn mode(&self) -> MintMode;

    /// Lamports held by `account`
    async fn balance(&self, account: &str) -> Result<u64, ChainError>;

    async fn create_tree(
        &self,
        authority: &str,
        params: &TreeParams,
    ) -> Result<TreeCreation, ChainError>;

    /// `mint_id` travels with the request so the relay can drop duplicates
    async fn mint_compressed(
        &self,
        mint_id: &str,
        tree: &str,
        leaf_index: u64,
        recipient: &str,
        metadata: &TargetMetadata,
    ) -> Result<MintReceipt, ChainError>;

    /// Whether the signature reached confirmed or finalized commitment
    async fn confirm(&self, signature: &str) -> Result<bool, ChainError>;
}

#[derive(Debug)]
struct SimulatedState {
    balance: u64,
    sequence: u64,
    failing_names: HashSet<String>,
    confirm: bool,
    reject: bool,
}

/// In-memory chain with deterministic addresses and failure injection
#[derive(Debug)]
pub struct SimulatedChain {
    state: Mutex<SimulatedState>,
}

impl SimulatedChain {
    pub fn new(balance: u64) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                balance,
                sequence: 0,
                failing_names: HashSet::new(),
                confirm: true,
                reject: false,
            }),
        }
    }

    /// Reject every mint whose metadata name equals `name`
    pub fn fail_mints_named(&self, name: impl Into<String>) {
        self.state.lock().failing_names.insert(name.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing_names.clear();
    }

    pub fn set_confirmations(&self, confirm: bool) {
        self.state.lock().confirm = confirm;
    }

    /// Report every signature as landed with an error
    pub fn reject_signatures(&self, reject: bool) {
        self.state.lock().reject = reject;
    }

    pub fn balance_now(&self) -> u64 {
        self.state.lock().balance
    }

    fn next_id(state: &mut SimulatedState, kind: &str, seed: &str) -> String {
        state.sequence += 1;
        let digest = Sha256::digest(format!("{}:{}:{}", kind, state.sequence, seed).as_bytes());
        format!("sim{}", hex::encode(&digest[..20]))
    }
}

#[async_trait]
impl TargetChain for SimulatedChain {
    fn mode(&self) -> MintMode {
        MintMode::Simulated
    }

    async fn balance(&self, _account: &str) -> Result<u64, ChainError> {
        Ok(self.state.lock().balance)
    }

    async fn create_tree(
        &self,
        authority: &str,
        params: &TreeParams,
    ) -> Result<TreeCreation, ChainError> {
        let cost = params.estimate_cost().total;
        let mut state = self.state.lock();
        if state.balance < cost {
            return Err(ChainError::Rejected {
                operation: "createMerkleTree",
                reason: format!("balance {} below rent {}", state.balance, cost),
            });
        }
        state.balance -= cost;

        Ok(TreeCreation {
            address: Self::next_id(&mut state, "tree", authority),
            signature: Self::next_id(&mut state, "sig", authority),
        })
    }

    async fn mint_compressed(
        &self,
        _mint_id: &str,
        tree: &str,
        leaf_index: u64,
        recipient: &str,
        metadata: &TargetMetadata,
    ) -> Result<MintReceipt, ChainError> {
        let mut state = self.state.lock();
        if state.failing_names.contains(&metadata.name) {
            return Err(ChainError::Rejected {
                operation: "mintCompressedNft",
                reason: format!("injected failure for '{}'", metadata.name),
            });
        }

        let seed = format!("{}:{}:{}", tree, leaf_index, recipient);
        Ok(MintReceipt {
            signature: Self::next_id(&mut state, "sig", &seed),
            asset_id: Self::next_id(&mut state, "asset", &seed),
        })
    }

    async fn confirm(&self, signature: &str) -> Result<bool, ChainError> {
        let state = self.state.lock();
        if state.reject {
            return Err(ChainError::Rejected {
                operation: "getSignatureStatuses",
                reason: format!("injected error for {}", signature),
            });
        }
        Ok(state.confirm)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTreeResponse {
    tree_address: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintResponse {
    signature: String,
    asset_id: String,
}

/// Live chain: JSON-RPC to the target pool, signing delegated to the relay
pub struct RpcChain {
    client: Arc<ResilientClient>,
}

impl RpcChain {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    fn decode<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        value: Value,
    ) -> Result<T, ChainError> {
        serde_json::from_value(value).map_err(|e| ChainError::UnexpectedResponse {
            operation,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl TargetChain for RpcChain {
    fn mode(&self) -> MintMode {
        MintMode::Live
    }

    async fn balance(&self, account: &str) -> Result<u64, ChainError> {
        let result = self.client.call("getBalance", json!([account])).await?;
        // Solana wraps the value in an RpcResponse context
        result
            .get("value")
            .and_then(Value::as_u64)
            .or_else(|| result.as_u64())
            .ok_or_else(|| ChainError::UnexpectedResponse {
                operation: "getBalance",
                reason: result.to_string(),
            })
    }

    async fn create_tree(
        &self,
        authority: &str,
        params: &TreeParams,
    ) -> Result<TreeCreation, ChainError> {
        let result = self
            .client
            .call_once(
                "createMerkleTree",
                json!([{
                    "authority": authority,
                    "maxDepth": params.max_depth,
                    "maxBufferSize": params.max_buffer_size,
                    "canopyDepth": params.canopy_depth,
                }]),
            )
            .await?;

        let response: CreateTreeResponse = Self::decode("createMerkleTree", result)?;
        Ok(TreeCreation {
            address: response.tree_address,
            signature: response.signature,
        })
    }

    async fn mint_compressed(
        &self,
        mint_id: &str,
        tree: &str,
        leaf_index: u64,
        recipient: &str,
        metadata: &TargetMetadata,
    ) -> Result<MintReceipt, ChainError> {
        // Sent once; a timeout may still have minted on the relay
        let result = self
            .client
            .call_once(
                "mintCompressedNft",
                json!([{
                    "mintId": mint_id,
                    "merkleTree": tree,
                    "leafIndex": leaf_index,
                    "leafOwner": recipient,
                    "metadata": metadata,
                }]),
            )
            .await?;

        let response: MintResponse = Self::decode("mintCompressedNft", result)?;
        Ok(MintReceipt {
            signature: response.signature,
            asset_id: response.asset_id,
        })
    }

    async fn confirm(&self, signature: &str) -> Result<bool, ChainError> {
        let result = self
            .client
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;

        let status = result
            .get("value")
            .and_then(|v| v.get(0))
            .cloned()
            .unwrap_or(Value::Null);

        if status.is_null() {
            return Ok(false);
        }
        if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
            return Err(ChainError::Rejected {
                operation: "getSignatureStatuses",
                reason: err.to_string(),
            });
        }

        Ok(matches!(
            status.get("confirmationStatus").and_then(Value::as_str),
            Some("confirmed") | Some("finalized")
        ))
    }
}
