//! Source-chain export
//!
//! Walks a CW721 contract with cursor pagination (`all_tokens`, `start_after`),
//! fetching `nft_info`, `owner_of` and the off-chain metadata for each token
//! with bounded concurrency.

mod error;
mod exporter;
mod fetch;
mod query;

pub use error::{ExportError, Result};
pub use exporter::{Exporter, Page};
pub use fetch::{HttpMetadataFetcher, MetadataFetcher, rewrite_content_uri};
pub use query::{ContractInfo, ContractQuerier, Cw721Query, LcdQuerier, smart_query_path};
