use crate::rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{query} on {contract} returned malformed data: {reason}")]
    Malformed {
        contract: String,
        query: &'static str,
        reason: String,
    },

    #[error("failed to encode query: {0}")]
    Encode(String),

    #[error("metadata fetch from {uri} failed: {reason}")]
    Metadata { uri: String, reason: String },

    #[error("unsupported metadata uri: {0}")]
    UnsupportedUri(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;
