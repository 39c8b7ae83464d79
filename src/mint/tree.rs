//! Merkle tree parameters, creation cost and state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// (max_depth, max_buffer_size) pairs accepted by the account compression program
const VALID_SIZES: &[(u32, u32)] = &[
    (3, 8),
    (5, 8),
    (14, 64),
    (14, 256),
    (14, 1024),
    (14, 2048),
    (15, 64),
    (16, 64),
    (17, 64),
    (18, 64),
    (19, 64),
    (20, 64),
    (20, 256),
    (20, 1024),
    (20, 2048),
    (24, 64),
    (24, 256),
    (24, 512),
    (24, 1024),
    (24, 2048),
    (26, 512),
    (26, 1024),
    (26, 2048),
    (30, 512),
    (30, 1024),
    (30, 2048),
];

const TREE_HEADER_SIZE: u64 = 1 + 55;
const TREE_CONFIG_ACCOUNT_SIZE: u64 = 96;
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
const RENT_EXEMPT_LAMPORTS_PER_BYTE: u64 = 6960;
const CREATION_FEE_LAMPORTS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeParamsError {
    #[error("unsupported tree size: max_depth {max_depth} with max_buffer_size {max_buffer_size}")]
    UnsupportedSize { max_depth: u32, max_buffer_size: u32 },

    #[error("canopy_depth {canopy_depth} must be less than max_depth {max_depth}")]
    CanopyTooDeep { canopy_depth: u32, max_depth: u32 },
}

/// Shape of a concurrent Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: u32,
    pub max_buffer_size: u32,
    #[serde(default)]
    pub canopy_depth: u32,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 14,
            max_buffer_size: 64,
            canopy_depth: 10,
        }
    }
}

impl TreeParams {
    pub fn check(&self) -> Result<(), TreeParamsError> {
        if !VALID_SIZES.contains(&(self.max_depth, self.max_buffer_size)) {
            return Err(TreeParamsError::UnsupportedSize {
                max_depth: self.max_depth,
                max_buffer_size: self.max_buffer_size,
            });
        }
        if self.canopy_depth >= self.max_depth {
            return Err(TreeParamsError::CanopyTooDeep {
                canopy_depth: self.canopy_depth,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    /// 2^max_depth leaves
    pub fn capacity(&self) -> u64 {
        1u64 << self.max_depth
    }

    /// Bytes of the tree account: header, change-log buffer, rightmost path and canopy
    pub fn account_size(&self) -> u64 {
        let depth = u64::from(self.max_depth);
        let path_size = 40 + 32 * depth;
        let tree = 24 + u64::from(self.max_buffer_size) * path_size + path_size;
        let canopy = if self.canopy_depth == 0 {
            0
        } else {
            ((1u64 << (self.canopy_depth + 1)) - 2) * 32
        };
        TREE_HEADER_SIZE + tree + canopy
    }

    pub fn estimate_cost(&self) -> TreeCost {
        let tree_rent = rent_exempt_minimum(self.account_size());
        let config_rent = rent_exempt_minimum(TREE_CONFIG_ACCOUNT_SIZE);
        TreeCost {
            tree_rent,
            config_rent,
            fee: CREATION_FEE_LAMPORTS,
            total: tree_rent + config_rent + CREATION_FEE_LAMPORTS,
        }
    }
}

fn rent_exempt_minimum(size: u64) -> u64 {
    (size + ACCOUNT_STORAGE_OVERHEAD) * RENT_EXEMPT_LAMPORTS_PER_BYTE
}

/// Estimated lamports to create a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeCost {
    pub tree_rent: u64,
    pub config_rent: u64,
    pub fee: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeStatus {
    Creating,
    Active,
    Full,
    Disabled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub address: String,
    pub authority: String,
    pub max_depth: u32,
    pub max_buffer_size: u32,
    pub canopy_depth: u32,
    pub capacity: u64,
    pub current_size: u64,
    pub status: TreeStatus,
    pub creation_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tree {
    pub fn new(address: impl Into<String>, authority: impl Into<String>, params: TreeParams) -> Self {
        Self {
            address: address.into(),
            authority: authority.into(),
            max_depth: params.max_depth,
            max_buffer_size: params.max_buffer_size,
            canopy_depth: params.canopy_depth,
            capacity: params.capacity(),
            current_size: 0,
            status: TreeStatus::Creating,
            creation_signature: None,
            created_at: Utc::now(),
        }
    }

    pub fn params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            max_buffer_size: self.max_buffer_size,
            canopy_depth: self.canopy_depth,
        }
    }

    /// creating -> active once the creation is confirmed
    pub fn activate(&mut self, signature: impl Into<String>) {
        if self.status == TreeStatus::Creating {
            self.status = TreeStatus::Active;
            self.creation_signature = Some(signature.into());
        }
    }

    /// Any state -> error once the ledger rejects the tree or one of its mints
    pub(crate) fn fail(&mut self) {
        self.status = TreeStatus::Error;
    }

    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.current_size)
    }

    pub fn has_room(&self, leaves: u64) -> bool {
        self.status == TreeStatus::Active && self.remaining() >= leaves
    }

    /// Claim the next leaf; the tree turns full when the last one is taken
    pub(crate) fn push_leaf(&mut self) -> u64 {
        let leaf_index = self.current_size;
        self.current_size += 1;
        if self.current_size >= self.capacity {
            self.status = TreeStatus::Full;
        }
        leaf_index
    }
}
