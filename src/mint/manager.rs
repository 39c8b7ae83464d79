//! Tree pool and idempotent minting

use super::chain::{ChainError, MintMode, TargetChain};
use super::error::{MintError, Result};
use super::tree::{Tree, TreeCost, TreeParams, TreeStatus};
use crate::config::MintConfig;
use crate::models::TargetMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MintStatus {
    Pending,
    Minting,
    Success,
    Confirmed,
    Failed,
}

impl MintStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MintStatus::Success | MintStatus::Confirmed)
    }
}

#[derive(Debug, Clone, bon::Builder)]
pub struct MintRequest {
    /// Idempotency key
    #[builder(into)]
    pub mint_id: String,
    #[builder(into)]
    pub tree_address: String,
    #[builder(into)]
    pub recipient: String,
    pub metadata: TargetMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintResult {
    pub mint_id: String,
    pub tree_address: String,
    pub status: MintStatus,
    pub signature: Option<String>,
    pub leaf_index: Option<u64>,
    pub asset_id: Option<String>,
    pub error: Option<String>,
    pub simulated: bool,
    pub minted_at: DateTime<Utc>,
}

/// Removes the mint id from the in-flight set when the attempt ends
struct InFlightGuard<'a> {
    set: &'a parking_lot::Mutex<HashSet<String>>,
    mint_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.mint_id);
    }
}

/// Owns the trees of one authority and mints into them
///
/// Each tree sits behind its own async mutex which is held for the whole mint,
/// so the leaf counter and the mint history move together per tree while
/// different trees mint in parallel.
pub struct TreeManager {
    chain: Arc<dyn TargetChain>,
    authority: String,
    default_params: TreeParams,
    confirm_mints: bool,
    trees: parking_lot::RwLock<Vec<(String, Arc<Mutex<Tree>>)>>,
    history: parking_lot::Mutex<HashMap<String, MintResult>>,
    in_flight: parking_lot::Mutex<HashSet<String>>,
    creation: Mutex<()>,
}

impl TreeManager {
    pub fn new(
        chain: Arc<dyn TargetChain>,
        authority: impl Into<String>,
        default_params: TreeParams,
        confirm_mints: bool,
    ) -> Self {
        Self {
            chain,
            authority: authority.into(),
            default_params,
            confirm_mints,
            trees: parking_lot::RwLock::new(Vec::new()),
            history: parking_lot::Mutex::new(HashMap::new()),
            in_flight: parking_lot::Mutex::new(HashSet::new()),
            creation: Mutex::new(()),
        }
    }

    pub fn from_config(chain: Arc<dyn TargetChain>, config: &MintConfig) -> Self {
        Self::new(
            chain,
            config.authority.clone(),
            config.default_tree,
            config.confirm_mints,
        )
    }

    pub fn mode(&self) -> MintMode {
        self.chain.mode()
    }

    pub fn estimate_cost(&self, params: &TreeParams) -> TreeCost {
        params.estimate_cost()
    }

    /// Create a tree after checking the funding balance covers the estimated cost
    pub async fn create_tree(&self, params: TreeParams) -> Result<Tree> {
        params.check()?;

        let cost = params.estimate_cost();
        let balance = self.chain.balance(&self.authority).await?;
        if balance < cost.total {
            warn!(
                authority = %self.authority,
                balance,
                required = cost.total,
                "Insufficient funds for tree creation"
            );
            return Err(MintError::InsufficientFunds {
                balance,
                required: cost.total,
            });
        }

        let creation = self.chain.create_tree(&self.authority, &params).await?;
        let mut tree = Tree::new(creation.address, self.authority.clone(), params);
        if let Err(err) = self.confirm_creation(&creation.signature).await {
            warn!(tree = %tree.address, error = %err, "Merkle tree creation rejected");
            tree.creation_signature = Some(creation.signature);
            tree.fail();
            self.register(tree);
            return Err(err);
        }
        tree.activate(creation.signature);

        info!(
            tree = %tree.address,
            max_depth = tree.max_depth,
            capacity = tree.capacity,
            cost = cost.total,
            simulated = self.mode() == MintMode::Simulated,
            "Merkle tree created"
        );

        self.register(tree.clone());
        Ok(tree)
    }

    fn register(&self, tree: Tree) {
        self.trees
            .write()
            .push((tree.address.clone(), Arc::new(Mutex::new(tree))));
    }

    /// Only a rejected signature blocks the tree; an unknown status leaves it usable
    async fn confirm_creation(&self, signature: &str) -> Result<()> {
        if !self.confirm_mints {
            return Ok(());
        }
        match self.chain.confirm(signature).await {
            Ok(_) => Ok(()),
            Err(err @ ChainError::Rejected { .. }) => Err(err.into()),
            Err(err) => {
                warn!(%signature, error = %err, "Tree creation status unavailable");
                Ok(())
            }
        }
    }

    /// An active tree with room for `leaves`, creating one with default parameters if needed
    pub async fn acquire(&self, leaves: u64) -> Result<Tree> {
        if let Some(tree) = self.find_with_room(leaves).await {
            return Ok(tree);
        }

        let _creating = self.creation.lock().await;
        if let Some(tree) = self.find_with_room(leaves).await {
            return Ok(tree);
        }

        if leaves > self.default_params.capacity() {
            return Err(MintError::Capacity {
                tree: "<new>".to_string(),
                capacity: self.default_params.capacity(),
            });
        }
        self.create_tree(self.default_params).await
    }

    async fn find_with_room(&self, leaves: u64) -> Option<Tree> {
        for handle in self.handles() {
            let tree = handle.lock().await;
            if tree.has_room(leaves) {
                return Some(tree.clone());
            }
        }
        None
    }

    fn handles(&self) -> Vec<Arc<Mutex<Tree>>> {
        self.trees.read().iter().map(|(_, t)| t.clone()).collect()
    }

    fn handle(&self, address: &str) -> Option<Arc<Mutex<Tree>>> {
        self.trees
            .read()
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, t)| t.clone())
    }

    pub async fn tree(&self, address: &str) -> Option<Tree> {
        let handle = self.handle(address)?;
        let tree = handle.lock().await;
        Some(tree.clone())
    }

    pub async fn trees(&self) -> Vec<Tree> {
        let mut trees = Vec::new();
        for handle in self.handles() {
            trees.push(handle.lock().await.clone());
        }
        trees
    }

    pub async fn disable_tree(&self, address: &str) -> Result<Tree> {
        let handle = self.handle(address).ok_or_else(|| MintError::TreeNotFound {
            tree: address.to_string(),
        })?;
        let mut tree = handle.lock().await;
        tree.status = TreeStatus::Disabled;
        info!(tree = %address, "Tree disabled");
        Ok(tree.clone())
    }

    pub fn mint_result(&self, mint_id: &str) -> Option<MintResult> {
        self.history.lock().get(mint_id).cloned()
    }

    /// Mint one compressed NFT
    ///
    /// A mint id with a successful or confirmed result returns that result
    /// without touching the chain. A full, missing or inactive tree fails
    /// without mutating anything.
    pub async fn mint(&self, request: MintRequest) -> Result<MintResult> {
        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(request.mint_id.clone()) {
                return Err(MintError::InFlight {
                    mint_id: request.mint_id,
                });
            }
            InFlightGuard {
                set: &self.in_flight,
                mint_id: request.mint_id.clone(),
            }
        };

        if let Some(prior) = self.prior_success(&request.mint_id) {
            debug!(mint_id = %request.mint_id, "Mint already recorded, returning prior result");
            return Ok(prior);
        }

        let handle = self
            .handle(&request.tree_address)
            .ok_or_else(|| MintError::TreeNotFound {
                tree: request.tree_address.clone(),
            })?;

        let mut result = {
            let mut tree = handle.lock().await;

            if tree.status == TreeStatus::Full || tree.remaining() == 0 {
                return Err(MintError::Capacity {
                    tree: tree.address.clone(),
                    capacity: tree.capacity,
                });
            }
            if tree.status != TreeStatus::Active {
                return Err(MintError::TreeNotActive {
                    tree: tree.address.clone(),
                    status: tree.status,
                });
            }

            let leaf_index = tree.current_size;
            let minted = self
                .chain
                .mint_compressed(
                    &request.mint_id,
                    &tree.address,
                    leaf_index,
                    &request.recipient,
                    &request.metadata,
                )
                .await;

            match minted {
                Ok(receipt) => {
                    tree.push_leaf();
                    let result = MintResult {
                        mint_id: request.mint_id.clone(),
                        tree_address: tree.address.clone(),
                        status: MintStatus::Success,
                        signature: Some(receipt.signature),
                        leaf_index: Some(leaf_index),
                        asset_id: Some(receipt.asset_id),
                        error: None,
                        simulated: self.mode() == MintMode::Simulated,
                        minted_at: Utc::now(),
                    };
                    self.history
                        .lock()
                        .insert(request.mint_id.clone(), result.clone());
                    result
                }
                Err(err) => {
                    warn!(mint_id = %request.mint_id, tree = %tree.address, error = %err, "Mint failed");
                    self.history.lock().insert(
                        request.mint_id.clone(),
                        MintResult {
                            mint_id: request.mint_id.clone(),
                            tree_address: tree.address.clone(),
                            status: MintStatus::Failed,
                            signature: None,
                            leaf_index: None,
                            asset_id: None,
                            error: Some(err.to_string()),
                            simulated: self.mode() == MintMode::Simulated,
                            minted_at: Utc::now(),
                        },
                    );
                    return Err(err.into());
                }
            }
        };

        if self.confirm_mints {
            self.confirm(&mut result).await?;
        }

        info!(
            mint_id = %result.mint_id,
            tree = %result.tree_address,
            leaf_index = ?result.leaf_index,
            status = ?result.status,
            "Compressed NFT minted"
        );
        Ok(result)
    }

    fn prior_success(&self, mint_id: &str) -> Option<MintResult> {
        self.history
            .lock()
            .get(mint_id)
            .filter(|r| r.status.is_success())
            .cloned()
    }

    /// A rejected signature fails the mint and takes its tree out of rotation
    async fn confirm(&self, result: &mut MintResult) -> Result<()> {
        let Some(signature) = result.signature.clone() else {
            return Ok(());
        };

        match self.chain.confirm(&signature).await {
            Ok(true) => {
                result.status = MintStatus::Confirmed;
                self.history
                    .lock()
                    .insert(result.mint_id.clone(), result.clone());
            }
            Ok(false) => {
                warn!(mint_id = %result.mint_id, %signature, "Mint not yet confirmed");
            }
            Err(err @ ChainError::Rejected { .. }) => {
                warn!(mint_id = %result.mint_id, %signature, error = %err, "Mint rejected on chain");
                result.status = MintStatus::Failed;
                result.asset_id = None;
                result.error = Some(err.to_string());
                self.history
                    .lock()
                    .insert(result.mint_id.clone(), result.clone());

                if let Some(handle) = self.handle(&result.tree_address) {
                    handle.lock().await.fail();
                    warn!(tree = %result.tree_address, "Tree moved to error");
                }
                return Err(err.into());
            }
            Err(err) => {
                warn!(mint_id = %result.mint_id, %signature, error = %err, "Mint confirmation failed");
            }
        }
        Ok(())
    }
}
