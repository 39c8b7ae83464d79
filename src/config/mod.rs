//! Configuration management for mintbridge
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mintbridge::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Source endpoints: {}", config.source.endpoints.len());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MINTBRIDGE__<section>__<key>`
//!
//! Examples:
//! - `MINTBRIDGE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MINTBRIDGE__BATCH__MAX_CONCURRENT_BATCHES=8`
//! - `MINTBRIDGE__EXPORT__PAGE_DELAY=250ms`
//!
//! The signing relay credential is only read from `MINTBRIDGE_RELAY_API_KEY`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mintbridge.toml`.
//! This can be overridden using the `MINTBRIDGE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    BatchConfig, ChainConfig, Config, EndpointConfig, ExportConfig, HealthProbe, MappingConfig,
    MintConfig, RecipientConfig, RetryConfig, ServerConfig, ValidationConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails
    /// (missing endpoints, invalid tree parameters, live mode without credentials).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[source.endpoints]]
name = "sei"
url = "https://rest.sei.example"

[[target.endpoints]]
name = "solana"
url = "https://api.mainnet-beta.solana.com"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.source.endpoints.len(), 1);
        assert_eq!(config.target.endpoints.len(), 1);
    }

    #[test]
    fn test_validation_catches_missing_target() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[source.endpoints]]
name = "sei"
url = "https://rest.sei.example"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::NoEndpoints { chain: "target" })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
ledger_path = "data/ledger"

[source]
failure_threshold = 5
health_check_interval = "30s"

[[source.endpoints]]
name = "sei-primary"
url = "https://rest.sei-apis.com"
priority = 0

[[source.endpoints]]
name = "sei-backup"
url = "https://sei-api.polkachu.com"
priority = 1

[target]
health_probe = { kind = "json_rpc", method = "getSlot" }

[[target.endpoints]]
name = "helius"
url = "https://mainnet.helius-rpc.com"

[export]
page_size = 100
batch_size = 10
ipfs_gateway = "https://gateway.pinata.cloud/ipfs/"

[mint]
mode = "simulated"
authority = "AuthorityPubkey1111111111111111111111111111"

[mint.default_tree]
max_depth = 20
max_buffer_size = 256
canopy_depth = 14

[batch]
batch_size = 50
max_concurrent_batches = 4
checkpoint_every = 10

[recipients]
fallback = "FallbackRecipient111111111111111111111111111"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.source.endpoints.len(), 2);
        assert_eq!(config.target.endpoints[0].name, "helius");
        assert_eq!(config.export.ipfs_gateway, "https://gateway.pinata.cloud/ipfs/");
        assert_eq!(config.mint.default_tree.max_depth, 20);
        assert_eq!(config.mint.default_tree.capacity(), 1 << 20);
        assert!(config.recipients.fallback.is_some());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/mintbridge.toml");
        let config = Config::load_from_path(path).unwrap();

        assert_eq!(config.source.endpoints.len(), 2);
        assert_eq!(config.mint.mode, crate::mint::MintMode::Simulated);
        assert_eq!(config.mint.default_tree.capacity(), 1 << 14);
        assert!(config.recipients.owners.is_empty());
    }
}
