//! In-process harness shared by the orchestrator tests

use super::Pipeline;
use crate::config::{ExportConfig, MappingConfig, RecipientConfig, ValidationConfig};
use crate::export::{ContractQuerier, Cw721Query, ExportError, Exporter, MetadataFetcher};
use crate::mapper::Mapper;
use crate::mint::{SimulatedChain, TreeManager, TreeParams};
use crate::store::MemoryStore;
use crate::validator::Validator;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub const CONTRACT: &str = "sei1forestcontract0000000000000000000000";
pub const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

/// CW721 contract with `n` tokens named `Oak #<id>`
pub struct FakeContract {
    tokens: BTreeMap<String, Value>,
    blank_images: Mutex<HashSet<String>>,
    pub page_queries: Mutex<u32>,
}

impl FakeContract {
    pub fn new(n: u32) -> Self {
        let tokens = (1..=n)
            .map(|i| {
                let id = format!("{:03}", i);
                let info = json!({
                    "token_uri": null,
                    "extension": {
                        "name": format!("Oak #{}", id),
                        "description": "A tall oak",
                        "image": format!("ipfs://Qm{}", id),
                        "attributes": [{"trait_type": "Species", "value": "Oak"}]
                    }
                });
                (id, info)
            })
            .collect();
        Self {
            tokens,
            blank_images: Mutex::new(HashSet::new()),
            page_queries: Mutex::new(0),
        }
    }

    pub fn blank_image(&self, token_id: &str) {
        self.blank_images.lock().insert(token_id.to_string());
    }
}

#[async_trait]
impl ContractQuerier for FakeContract {
    async fn smart_query(&self, _contract: &str, query: &Cw721Query) -> crate::export::Result<Value> {
        match query {
            Cw721Query::ContractInfo {} => Ok(json!({"name": "Forest", "symbol": "FRST"})),
            Cw721Query::AllTokens { start_after, limit } => {
                *self.page_queries.lock() += 1;
                let tokens: Vec<&String> = self
                    .tokens
                    .keys()
                    .filter(|id| start_after.as_ref().is_none_or(|s| *id > s))
                    .take(*limit as usize)
                    .collect();
                Ok(json!({"tokens": tokens}))
            }
            Cw721Query::NftInfo { token_id } => {
                let mut info = self.tokens[token_id].clone();
                if self.blank_images.lock().contains(token_id) {
                    info["extension"]["image"] = json!("");
                }
                Ok(info)
            }
            Cw721Query::OwnerOf { token_id } => Ok(json!({
                "owner": format!("sei1qy352eufqy352eufqy352eufqy352euf{}", token_id),
                "approvals": []
            })),
        }
    }
}

pub struct NoMetadata;

#[async_trait]
impl MetadataFetcher for NoMetadata {
    async fn fetch(&self, uri: &str) -> crate::export::Result<Value> {
        Err(ExportError::Metadata {
            uri: uri.to_string(),
            reason: "no off-chain metadata in tests".into(),
        })
    }
}

pub struct Harness {
    pub contract: Arc<FakeContract>,
    pub store: Arc<MemoryStore>,
    pub chain: Arc<SimulatedChain>,
    pub trees: Arc<TreeManager>,
    pub pipeline: Arc<Pipeline>,
}

/// Trees of depth 3 (8 leaves), every owner mapped to [`RECIPIENT`]
pub fn harness(tokens: u32) -> Harness {
    harness_with(tokens, Some(RECIPIENT))
}

pub fn harness_with(tokens: u32, fallback: Option<&str>) -> Harness {
    let contract = Arc::new(FakeContract::new(tokens));
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(SimulatedChain::new(10_000_000_000));
    let params = TreeParams {
        max_depth: 3,
        max_buffer_size: 8,
        canopy_depth: 0,
    };
    let trees = Arc::new(TreeManager::new(chain.clone(), RECIPIENT, params, true));

    let export = ExportConfig {
        page_size: 5,
        page_delay: crate::config::HumanDuration::from_millis(0),
        ..Default::default()
    };
    let exporter = Exporter::new(contract.clone(), Arc::new(NoMetadata), &export);
    let mapper = Mapper::new(MappingConfig::default(), &export);
    let validator = Validator::new(
        store.clone(),
        ValidationConfig::default(),
        MappingConfig::default(),
    );

    let pipeline = Pipeline::builder()
        .exporter(Arc::new(exporter))
        .mapper(Arc::new(mapper))
        .validator(Arc::new(validator))
        .trees(trees.clone())
        .store(store.clone())
        .recipients(RecipientConfig {
            owners: BTreeMap::new(),
            fallback: fallback.map(str::to_string),
        })
        .build();

    Harness {
        contract,
        store,
        chain,
        trees,
        pipeline: Arc::new(pipeline),
    }
}
