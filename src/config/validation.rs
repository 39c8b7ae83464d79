use super::models::{ChainConfig, Config};
use crate::mint::{MintMode, TreeParamsError};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No endpoints configured for the {chain} chain")]
    NoEndpoints { chain: &'static str },

    #[error("Duplicate endpoint name '{name}' on the {chain} chain")]
    DuplicateEndpoint { chain: &'static str, name: String },

    #[error("Endpoint '{name}' has a non-http url: {url}")]
    InvalidEndpointUrl { name: String, url: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("Gateway '{gateway}' must be an http(s) url")]
    InvalidGateway { gateway: String },

    #[error("Default tree parameters are invalid: {0}")]
    InvalidTreeParams(#[from] TreeParamsError),

    #[error("Mint mode is live but the relay API key is missing")]
    MissingRelayCredentials,

    #[error("Mint mode is live but no authority account is configured")]
    MissingAuthority,

    #[error("max_failure_rate must be within 0.0..=1.0, got {0}")]
    InvalidFailureRate(f64),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_chain("source", &config.source)?;
    validate_chain("target", &config.target)?;
    validate_export(config)?;
    validate_batch(config)?;
    validate_mint(config)?;
    validate_thresholds(config)?;
    Ok(())
}

fn validate_chain(chain: &'static str, chain_config: &ChainConfig) -> Result<(), ValidationError> {
    if chain_config.endpoints.is_empty() {
        return Err(ValidationError::NoEndpoints { chain });
    }

    let mut seen = HashSet::new();
    for endpoint in &chain_config.endpoints {
        if !seen.insert(endpoint.name.as_str()) {
            return Err(ValidationError::DuplicateEndpoint {
                chain,
                name: endpoint.name.clone(),
            });
        }

        if !is_http_url(&endpoint.url) {
            return Err(ValidationError::InvalidEndpointUrl {
                name: endpoint.name.clone(),
                url: endpoint.url.clone(),
            });
        }
    }

    if chain_config.retry.max_attempts == 0 {
        return Err(ValidationError::ZeroValue {
            field: "retry.max_attempts",
        });
    }

    Ok(())
}

fn validate_export(config: &Config) -> Result<(), ValidationError> {
    if config.export.page_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "export.page_size",
        });
    }
    if config.export.batch_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "export.batch_size",
        });
    }

    for gateway in [&config.export.ipfs_gateway, &config.export.arweave_gateway] {
        if !is_http_url(gateway) {
            return Err(ValidationError::InvalidGateway {
                gateway: gateway.clone(),
            });
        }
    }

    Ok(())
}

fn validate_batch(config: &Config) -> Result<(), ValidationError> {
    if config.batch.batch_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "batch.batch_size",
        });
    }
    if config.batch.max_concurrent_batches == 0 {
        return Err(ValidationError::ZeroValue {
            field: "batch.max_concurrent_batches",
        });
    }
    if config.batch.checkpoint_every == 0 {
        return Err(ValidationError::ZeroValue {
            field: "batch.checkpoint_every",
        });
    }
    Ok(())
}

fn validate_mint(config: &Config) -> Result<(), ValidationError> {
    config.mint.default_tree.check()?;

    if config.mint.mode == MintMode::Live {
        if config.mint.relay_api_key.is_none() {
            return Err(ValidationError::MissingRelayCredentials);
        }
        if config.mint.authority.is_empty() {
            return Err(ValidationError::MissingAuthority);
        }
    }

    Ok(())
}

fn validate_thresholds(config: &Config) -> Result<(), ValidationError> {
    let rate = config.validation.max_failure_rate;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ValidationError::InvalidFailureRate(rate));
    }
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
