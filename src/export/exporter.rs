//! Paginated CW721 export

use super::error::Result;
use super::fetch::MetadataFetcher;
use super::query::{
    ContractInfo, ContractQuerier, Cw721Query, NftInfoResponse, OwnerOfResponse, TokensResponse,
    decode,
};
use crate::config::ExportConfig;
use crate::models::SourceRecord;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One page of token ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub token_ids: Vec<String>,
    /// Cursor for the following page (last id of this one)
    pub next_cursor: Option<String>,
    /// The contract has no tokens after this page
    pub is_last: bool,
}

struct ExportState {
    cursor: Option<String>,
    buffer: VecDeque<SourceRecord>,
    collection: Option<ContractInfo>,
    pages: u64,
    exhausted: bool,
}

pub struct Exporter {
    querier: Arc<dyn ContractQuerier>,
    fetcher: Arc<dyn MetadataFetcher>,
    page_size: u32,
    batch_size: usize,
    page_delay: Duration,
}

impl Exporter {
    pub fn new(
        querier: Arc<dyn ContractQuerier>,
        fetcher: Arc<dyn MetadataFetcher>,
        config: &ExportConfig,
    ) -> Self {
        Self {
            querier,
            fetcher,
            page_size: config.page_size.max(1),
            batch_size: config.batch_size.max(1),
            page_delay: config.page_delay.as_duration(),
        }
    }

    /// Collection name and symbol
    pub async fn contract_info(&self, contract: &str) -> Result<ContractInfo> {
        let query = Cw721Query::ContractInfo {};
        let data = self.querier.smart_query(contract, &query).await?;
        decode(contract, &query, data)
    }

    /// Token ids strictly after `start_after`
    pub async fn fetch_page(&self, contract: &str, start_after: Option<&str>) -> Result<Page> {
        let query = Cw721Query::AllTokens {
            start_after: start_after.map(str::to_string),
            limit: self.page_size,
        };
        let data = self.querier.smart_query(contract, &query).await?;
        let response: TokensResponse = decode(contract, &query, data)?;

        let is_last = response.tokens.len() < self.page_size as usize;
        let next_cursor = response
            .tokens
            .last()
            .cloned()
            .or_else(|| start_after.map(str::to_string));

        Ok(Page {
            token_ids: response.tokens,
            next_cursor,
            is_last,
        })
    }

    /// Owner, on-chain info and off-chain metadata for one token
    pub async fn fetch_token(
        &self,
        contract: &str,
        token_id: &str,
        collection: Option<&ContractInfo>,
    ) -> Result<SourceRecord> {
        let info_query = Cw721Query::NftInfo {
            token_id: token_id.to_string(),
        };
        let owner_query = Cw721Query::OwnerOf {
            token_id: token_id.to_string(),
        };

        let (info, owner) = tokio::try_join!(
            self.querier.smart_query(contract, &info_query),
            self.querier.smart_query(contract, &owner_query),
        )?;
        let info: NftInfoResponse = decode(contract, &info_query, info)?;
        let owner: OwnerOfResponse = decode(contract, &owner_query, owner)?;

        let off_chain = match info.token_uri.as_deref().filter(|u| !u.is_empty()) {
            Some(uri) => match self.fetcher.fetch(uri).await {
                Ok(doc) => Some(doc),
                Err(err) => {
                    warn!(
                        record = %format!("{}:{}", contract, token_id),
                        error = %err,
                        "Off-chain metadata unavailable, using on-chain extension"
                    );
                    None
                }
            },
            None => None,
        };

        let docs: Vec<&Value> = off_chain.iter().chain(std::iter::once(&info.extension)).collect();
        let attributes = docs
            .iter()
            .find_map(|doc| {
                doc.get("attributes")
                    .or_else(|| doc.get("traits"))
                    .and_then(Value::as_array)
            })
            .cloned()
            .unwrap_or_default();

        let record = SourceRecord {
            source_contract: contract.to_string(),
            source_token_id: token_id.to_string(),
            owner: owner.owner,
            name: first_text(&docs, &["name"]).unwrap_or_default(),
            description: first_text(&docs, &["description"]).unwrap_or_default(),
            image_uri: first_text(&docs, &["image", "image_url", "image_uri"]).unwrap_or_default(),
            external_uri: first_text(&docs, &["external_url", "external_uri"]),
            attributes,
            collection_name: collection.map(|c| c.name.clone()).filter(|n| !n.is_empty()),
            collection_symbol: collection.map(|c| c.symbol.clone()).filter(|s| !s.is_empty()),
            raw_metadata: json!({
                "token_uri": info.token_uri,
                "extension": info.extension,
                "off_chain": off_chain,
            }),
            content_hash: String::new(),
        };

        Ok(record.sealed())
    }

    /// Every token of `contract`, page by page
    pub fn export<'a>(
        &'a self,
        contract: &'a str,
    ) -> impl Stream<Item = Result<SourceRecord>> + Send + 'a {
        self.export_from(contract, None)
    }

    /// Resume an export after the token id `start_after`
    ///
    /// A token that fails to fetch is logged and skipped. A page query that
    /// fails yields the error and ends the stream.
    pub fn export_from<'a>(
        &'a self,
        contract: &'a str,
        start_after: Option<String>,
    ) -> impl Stream<Item = Result<SourceRecord>> + Send + 'a {
        let state = ExportState {
            cursor: start_after,
            buffer: VecDeque::new(),
            collection: None,
            pages: 0,
            exhausted: false,
        };

        stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(record) = state.buffer.pop_front() {
                    return Some((Ok(record), state));
                }
                if state.exhausted {
                    return None;
                }

                if state.pages == 0 {
                    state.collection = match self.contract_info(contract).await {
                        Ok(info) => Some(info),
                        Err(err) => {
                            warn!(contract, error = %err, "Contract info unavailable");
                            None
                        }
                    };
                } else {
                    tokio::time::sleep(self.page_delay).await;
                }

                let page = match self.fetch_page(contract, state.cursor.as_deref()).await {
                    Ok(page) => page,
                    Err(err) => {
                        state.exhausted = true;
                        return Some((Err(err), state));
                    }
                };

                state.pages += 1;
                state.exhausted = page.is_last;
                state.cursor = page.next_cursor.clone();
                debug!(
                    contract,
                    page = state.pages,
                    tokens = page.token_ids.len(),
                    "Fetched token page"
                );

                let records = self
                    .fetch_records(contract, &page.token_ids, state.collection.as_ref())
                    .await;
                state.buffer.extend(records);

                if state.exhausted {
                    info!(contract, pages = state.pages, "Export pagination complete");
                }
            }
        })
    }

    async fn fetch_records(
        &self,
        contract: &str,
        token_ids: &[String],
        collection: Option<&ContractInfo>,
    ) -> Vec<SourceRecord> {
        stream::iter(token_ids.iter().cloned())
            .map(|token_id| async move {
                let result = self.fetch_token(contract, &token_id, collection).await;
                (token_id, result)
            })
            .buffered(self.batch_size)
            .filter_map(|(token_id, result)| async move {
                match result {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(
                            record = %format!("{}:{}", contract, token_id),
                            phase = "export",
                            error = %err,
                            "Token fetch failed, skipping"
                        );
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

fn first_text(docs: &[&Value], keys: &[&str]) -> Option<String> {
    docs.iter().find_map(|doc| {
        keys.iter().find_map(|key| {
            doc.get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::error::ExportError;
    use crate::rpc::RpcError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashSet};

    /// Contract backed by an ordered token map
    struct FakeContract {
        tokens: BTreeMap<String, Value>,
        broken: HashSet<String>,
        page_queries: Mutex<Vec<Option<String>>>,
    }

    impl FakeContract {
        fn new(ids: &[&str]) -> Self {
            let tokens = ids
                .iter()
                .map(|id| {
                    (
                        id.to_string(),
                        json!({
                            "token_uri": format!("ipfs://meta{}", id),
                            "extension": {"name": format!("On-chain #{}", id), "image": "ipfs://Qmimg"}
                        }),
                    )
                })
                .collect();
            Self {
                tokens,
                broken: HashSet::new(),
                page_queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ContractQuerier for FakeContract {
        async fn smart_query(&self, _contract: &str, query: &Cw721Query) -> Result<Value> {
            match query {
                Cw721Query::ContractInfo {} => Ok(json!({"name": "Forest", "symbol": "FRST"})),
                Cw721Query::AllTokens { start_after, limit } => {
                    self.page_queries.lock().push(start_after.clone());
                    let tokens: Vec<&String> = self
                        .tokens
                        .keys()
                        .filter(|id| start_after.as_ref().is_none_or(|s| *id > s))
                        .take(*limit as usize)
                        .collect();
                    Ok(json!({"tokens": tokens}))
                }
                Cw721Query::NftInfo { token_id } => {
                    if self.broken.contains(token_id) {
                        return Err(ExportError::Rpc(RpcError::Timeout {
                            endpoint: "lcd".into(),
                        }));
                    }
                    Ok(self.tokens[token_id].clone())
                }
                Cw721Query::OwnerOf { token_id } => {
                    Ok(json!({"owner": format!("sei1owner{}", token_id), "approvals": []}))
                }
            }
        }
    }

    struct FakeFetcher {
        offline: bool,
    }

    #[async_trait]
    impl MetadataFetcher for FakeFetcher {
        async fn fetch(&self, uri: &str) -> Result<Value> {
            if self.offline {
                return Err(ExportError::Metadata {
                    uri: uri.to_string(),
                    reason: "offline".into(),
                });
            }
            Ok(json!({
                "name": format!("Off-chain {}", uri),
                "description": "From IPFS",
                "attributes": [{"trait_type": "Species", "value": "Oak"}]
            }))
        }
    }

    fn exporter(contract: FakeContract, offline: bool, page_size: u32) -> (Exporter, Arc<FakeContract>) {
        let contract = Arc::new(contract);
        let config = ExportConfig {
            page_size,
            batch_size: 2,
            page_delay: crate::config::HumanDuration::from_millis(1),
            ..Default::default()
        };
        (
            Exporter::new(contract.clone(), Arc::new(FakeFetcher { offline }), &config),
            contract,
        )
    }

    #[tokio::test]
    async fn test_three_tokens_page_size_two() {
        let (exporter, contract) = exporter(FakeContract::new(&["t1", "t2", "t3"]), false, 2);

        let records: Vec<SourceRecord> = exporter
            .export("sei1contract")
            .map(|r| r.unwrap())
            .collect()
            .await;

        let ids: Vec<&str> = records.iter().map(|r| r.source_token_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(
            *contract.page_queries.lock(),
            vec![None, Some("t2".to_string())]
        );
        assert!(records.iter().all(SourceRecord::verify_hash));
    }

    #[tokio::test]
    async fn test_full_last_page_needs_empty_probe() {
        let (exporter, contract) = exporter(FakeContract::new(&["a", "b"]), false, 2);

        let records: Vec<_> = exporter.export("sei1c").collect().await;

        assert_eq!(records.len(), 2);
        assert_eq!(contract.page_queries.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_token_is_skipped() {
        let mut contract = FakeContract::new(&["1", "2", "3"]);
        contract.broken.insert("2".into());
        let (exporter, _) = exporter(contract, false, 10);

        let records: Vec<SourceRecord> =
            exporter.export("sei1c").map(|r| r.unwrap()).collect().await;

        let ids: Vec<&str> = records.iter().map(|r| r.source_token_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_off_chain_metadata_preferred() {
        let (exporter, _) = exporter(FakeContract::new(&["1"]), false, 10);
        let collection = exporter.contract_info("sei1c").await.unwrap();

        let record = exporter.fetch_token("sei1c", "1", Some(&collection)).await.unwrap();

        assert_eq!(record.name, "Off-chain ipfs://meta1");
        assert_eq!(record.description, "From IPFS");
        // not in the off-chain document, taken from the extension
        assert_eq!(record.image_uri, "ipfs://Qmimg");
        assert_eq!(record.owner, "sei1owner1");
        assert_eq!(record.attributes.len(), 1);
        assert_eq!(record.collection_symbol.as_deref(), Some("FRST"));
    }

    #[tokio::test]
    async fn test_falls_back_to_extension_when_offline() {
        let (exporter, _) = exporter(FakeContract::new(&["1"]), true, 10);

        let record = exporter.fetch_token("sei1c", "1", None).await.unwrap();

        assert_eq!(record.name, "On-chain #1");
        assert!(record.raw_metadata["off_chain"].is_null());
        assert!(record.collection_name.is_none());
    }

    #[tokio::test]
    async fn test_resume_from_cursor() {
        let (exporter, _) = exporter(FakeContract::new(&["1", "2", "3"]), false, 10);

        let records: Vec<SourceRecord> = exporter
            .export_from("sei1c", Some("1".into()))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_token_id, "2");
    }
}
