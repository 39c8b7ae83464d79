use crate::humanize::HumanDuration;
use crate::mint::{MintMode, TreeParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: ChainConfig,
    #[serde(default)]
    pub target: ChainConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub mint: MintConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub recipients: RecipientConfig,
}

/// Operator server and local persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Local directory for the export archive; in-memory when unset
    pub archive_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
            archive_path: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// One RPC endpoint as declared in configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    /// Lower is preferred
    #[serde(default)]
    pub priority: u32,
}

/// Lightweight liveness query used by endpoint health checks
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthProbe {
    /// JSON-RPC call without params, e.g. `getSlot`
    JsonRpc { method: String },
    /// REST GET relative to the endpoint url, e.g. the latest block
    Get { path: String },
}

/// Retry policy for RPC calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay: HumanDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> HumanDuration {
    HumanDuration::from_millis(500)
}

/// Endpoint pool configuration for one chain
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// Chain-specific default is applied by the engine when unset
    pub health_probe: Option<HealthProbe>,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            health_probe: None,
            failure_threshold: default_failure_threshold(),
            health_check_interval: default_health_check_interval(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_failure_threshold() -> u64 {
    5
}

fn default_health_check_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Source-chain export settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Concurrent per-token detail fetches within a page
    #[serde(default = "default_export_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_page_delay")]
    pub page_delay: HumanDuration,
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    #[serde(default = "default_arweave_gateway")]
    pub arweave_gateway: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_export_batch_size(),
            page_delay: default_page_delay(),
            ipfs_gateway: default_ipfs_gateway(),
            arweave_gateway: default_arweave_gateway(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_export_batch_size() -> usize {
    10
}

fn default_page_delay() -> HumanDuration {
    HumanDuration::from_millis(100)
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io/ipfs/".to_string()
}

fn default_arweave_gateway() -> String {
    "https://arweave.net/".to_string()
}

/// Field rules applied by the mapper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    #[serde(default = "default_max_symbol_length")]
    pub max_symbol_length: usize,
    #[serde(default = "default_symbol")]
    pub default_symbol: String,
    #[serde(default = "default_description")]
    pub default_description: String,
    #[serde(default)]
    pub seller_fee_basis_points: u16,
    #[serde(default = "default_migration_source")]
    pub migration_source: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            max_description_length: default_max_description_length(),
            max_symbol_length: default_max_symbol_length(),
            default_symbol: default_symbol(),
            default_description: default_description(),
            seller_fee_basis_points: 0,
            migration_source: default_migration_source(),
        }
    }
}

fn default_max_name_length() -> usize {
    32
}

fn default_max_description_length() -> usize {
    200
}

fn default_max_symbol_length() -> usize {
    10
}

fn default_symbol() -> String {
    "MNFT".to_string()
}

fn default_description() -> String {
    "NFT migrated from Sei to Solana".to_string()
}

fn default_migration_source() -> String {
    "Sei".to_string()
}

/// Tree and mint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MintConfig {
    #[serde(default)]
    pub mode: MintMode,
    /// Tree authority and funding account on the target chain
    #[serde(default)]
    pub authority: String,
    /// Signing relay credential (loaded from environment, not from config file)
    #[serde(skip)]
    pub relay_api_key: Option<String>,
    #[serde(default)]
    pub default_tree: TreeParams,
    /// Starting balance of the simulated funding account, in lamports
    #[serde(default = "default_simulated_balance")]
    pub simulated_balance: u64,
    #[serde(default = "default_confirm_mints")]
    pub confirm_mints: bool,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            mode: MintMode::default(),
            authority: String::new(),
            relay_api_key: None,
            default_tree: TreeParams::default(),
            simulated_balance: default_simulated_balance(),
            confirm_mints: default_confirm_mints(),
        }
    }
}

fn default_simulated_balance() -> u64 {
    10_000_000_000 // 10 SOL
}

fn default_confirm_mints() -> bool {
    true
}

/// Batch coordinator settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Persist job counters every N finished items
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_checkpoint_every() -> usize {
    10
}

/// Integrity thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_source_address_len")]
    pub min_source_address_len: usize,
    #[serde(default = "default_min_target_address_len")]
    pub min_target_address_len: usize,
    #[serde(default = "default_source_address_prefix")]
    pub source_address_prefix: String,
    /// Soft ceiling, exceeding it is a warning
    #[serde(default = "default_max_attributes")]
    pub max_attributes: usize,
    /// Failure ratio above which job progress validation asks for rollback
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_source_address_len: default_min_source_address_len(),
            min_target_address_len: default_min_target_address_len(),
            source_address_prefix: default_source_address_prefix(),
            max_attributes: default_max_attributes(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

fn default_min_source_address_len() -> usize {
    20
}

fn default_min_target_address_len() -> usize {
    32
}

fn default_source_address_prefix() -> String {
    "sei1".to_string()
}

fn default_max_attributes() -> usize {
    50
}

fn default_max_failure_rate() -> f64 {
    0.5
}

/// Source owner -> target recipient mapping
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecipientConfig {
    #[serde(default)]
    pub owners: BTreeMap<String, String>,
    /// Used for owners without an explicit mapping
    pub fallback: Option<String>,
}

impl RecipientConfig {
    pub fn resolve(&self, owner: &str) -> Option<&str> {
        self.owners
            .get(owner)
            .map(String::as_str)
            .or(self.fallback.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.source.failure_threshold, 5);
        assert_eq!(config.target.retry.max_attempts, 3);
        assert_eq!(config.target.retry.base_delay.as_duration(), Duration::from_millis(500));
        assert_eq!(config.mapping.max_name_length, 32);
        assert_eq!(config.mapping.max_description_length, 200);
        assert_eq!(config.mapping.max_symbol_length, 10);
        assert_eq!(config.batch.checkpoint_every, 10);
        assert_eq!(config.mint.mode, MintMode::Simulated);
    }

    #[test]
    fn test_health_probe_tagged() {
        let config: Config = toml::from_str(
            r#"
[source]
health_probe = { kind = "get", path = "/cosmos/base/tendermint/v1beta1/blocks/latest" }

[target]
health_probe = { kind = "json_rpc", method = "getSlot" }
            "#,
        )
        .unwrap();

        assert!(matches!(config.source.health_probe, Some(HealthProbe::Get { .. })));
        assert_eq!(
            config.target.health_probe,
            Some(HealthProbe::JsonRpc { method: "getSlot".to_string() })
        );
    }

    #[test]
    fn test_recipient_resolution() {
        let mut recipients = RecipientConfig::default();
        recipients
            .owners
            .insert("sei1owner".to_string(), "SolRecipient".to_string());

        assert_eq!(recipients.resolve("sei1owner"), Some("SolRecipient"));
        assert_eq!(recipients.resolve("sei1other"), None);

        recipients.fallback = Some("SolFallback".to_string());
        assert_eq!(recipients.resolve("sei1other"), Some("SolFallback"));
    }
}
