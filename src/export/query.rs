//! CW721 smart queries over the Cosmos LCD

use super::error::{ExportError, Result};
use crate::rpc::ResilientClient;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Query messages understood by CW721 contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cw721Query {
    AllTokens {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_after: Option<String>,
        limit: u32,
    },
    NftInfo {
        token_id: String,
    },
    OwnerOf {
        token_id: String,
    },
    ContractInfo {},
}

impl Cw721Query {
    pub fn name(&self) -> &'static str {
        match self {
            Cw721Query::AllTokens { .. } => "all_tokens",
            Cw721Query::NftInfo { .. } => "nft_info",
            Cw721Query::OwnerOf { .. } => "owner_of",
            Cw721Query::ContractInfo {} => "contract_info",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokensResponse {
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NftInfoResponse {
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub extension: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerOfResponse {
    pub owner: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContractInfo {
    pub name: String,
    pub symbol: String,
}

/// `/cosmwasm/wasm/v1/contract/<contract>/smart/<base64 query>`
pub fn smart_query_path(contract: &str, query: &Cw721Query) -> Result<String> {
    let json = serde_json::to_vec(query).map_err(|e| ExportError::Encode(e.to_string()))?;
    let encoded = STANDARD
        .encode(json)
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D");
    Ok(format!("/cosmwasm/wasm/v1/contract/{}/smart/{}", contract, encoded))
}

/// Runs smart queries against a source contract, returning the `data` document
#[async_trait]
pub trait ContractQuerier: Send + Sync {
    async fn smart_query(&self, contract: &str, query: &Cw721Query) -> Result<Value>;
}

/// Smart queries through the source chain's LCD endpoint pool
pub struct LcdQuerier {
    client: Arc<ResilientClient>,
}

impl LcdQuerier {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContractQuerier for LcdQuerier {
    async fn smart_query(&self, contract: &str, query: &Cw721Query) -> Result<Value> {
        let path = smart_query_path(contract, query)?;
        let mut response = self.client.get(&path).await?;

        match response.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(ExportError::Malformed {
                contract: contract.to_string(),
                query: query.name(),
                reason: "response has no data field".to_string(),
            }),
        }
    }
}

/// Decode a typed response, attributing failures to the query
pub fn decode<T: serde::de::DeserializeOwned>(
    contract: &str,
    query: &Cw721Query,
    data: Value,
) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ExportError::Malformed {
        contract: contract.to_string(),
        query: query.name(),
        reason: e.to_string(),
    })
}
