//! Off-chain metadata documents

use super::error::{ExportError, Result};
use crate::rpc::Transport;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::sync::Arc;

/// Rewrite a content-addressed uri (`ipfs://`, `ar://`) through its HTTP gateway
///
/// Returns `None` for any other scheme.
pub fn rewrite_content_uri(uri: &str, ipfs_gateway: &str, arweave_gateway: &str) -> Option<String> {
    if let Some(rest) = uri.strip_prefix("ipfs://") {
        let cid = rest.strip_prefix("ipfs/").unwrap_or(rest);
        return Some(join_gateway(ipfs_gateway, cid));
    }
    if let Some(rest) = uri.strip_prefix("ar://") {
        return Some(join_gateway(arweave_gateway, rest));
    }
    None
}

fn join_gateway(gateway: &str, path: &str) -> String {
    if gateway.ends_with('/') {
        format!("{}{}", gateway, path)
    } else {
        format!("{}/{}", gateway, path)
    }
}

/// Dereferences a token uri into its JSON metadata document
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Value>;
}

/// Fetches http(s) and gateway-rewritten uris, decodes inline `data:` uris
pub struct HttpMetadataFetcher {
    transport: Arc<dyn Transport>,
    ipfs_gateway: String,
    arweave_gateway: String,
}

impl HttpMetadataFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        ipfs_gateway: impl Into<String>,
        arweave_gateway: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            ipfs_gateway: ipfs_gateway.into(),
            arweave_gateway: arweave_gateway.into(),
        }
    }

    fn decode_data_uri(uri: &str) -> Result<Value> {
        let invalid = |reason: String| ExportError::Metadata {
            uri: uri.chars().take(64).collect(),
            reason,
        };

        let (header, payload) = uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or_else(|| invalid("missing payload".to_string()))?;

        let bytes = if header.ends_with(";base64") {
            STANDARD
                .decode(payload)
                .map_err(|e| invalid(e.to_string()))?
        } else {
            payload.as_bytes().to_vec()
        };

        serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Result<Value> {
        if uri.starts_with("data:") {
            return Self::decode_data_uri(uri);
        }

        let url = match rewrite_content_uri(uri, &self.ipfs_gateway, &self.arweave_gateway) {
            Some(url) => url,
            None if uri.starts_with("http://") || uri.starts_with("https://") => uri.to_string(),
            None => return Err(ExportError::UnsupportedUri(uri.to_string())),
        };

        self.transport
            .get_json(&url)
            .await
            .map_err(|e| ExportError::Metadata {
                uri: url,
                reason: e.to_string(),
            })
    }
}
