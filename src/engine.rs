//! Wiring of every component from a [`Config`]
//!
//! Nothing in the crate reaches for a global: the engine builds the RPC
//! clients, the store, the tree manager and the orchestrator once and hands
//! them down explicitly. Tests assemble the same graph from fake transports.

use crate::archive::{ArchiveError, ExportArchive};
use crate::config::{ChainConfig, Config, HealthProbe};
use crate::export::{Exporter, HttpMetadataFetcher, LcdQuerier};
use crate::ledger::{FjallStore, LedgerError};
use crate::mapper::Mapper;
use crate::mint::{MintMode, RpcChain, SimulatedChain, TargetChain, TreeManager};
use crate::observability::{EngineMetrics, MetricsSnapshot};
use crate::orchestrator::{Orchestrator, Pipeline};
use crate::rpc::{HealthSummary, HttpConfig, HttpTransport, ResilientClient, Transport, TransportError};
use crate::store::MigrationStore;
use crate::validator::Validator;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const SOURCE_PROBE_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks/latest";
const TARGET_PROBE_METHOD: &str = "getSlot";
const RELAY_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("failed to open export archive: {0}")]
    Archive(#[from] ArchiveError),
}

/// HTTP transports for the two chains and for off-chain metadata
#[derive(Clone)]
pub struct Transports {
    pub source: Arc<dyn Transport>,
    pub target: Arc<dyn Transport>,
    pub metadata: Arc<dyn Transport>,
}

impl Transports {
    pub fn http(config: &Config) -> Result<Self, EngineError> {
        let mut target = http_config(&config.target);
        if let Some(key) = &config.mint.relay_api_key {
            target
                .default_headers
                .push((RELAY_KEY_HEADER.to_string(), key.clone()));
        }

        Ok(Self {
            source: Arc::new(HttpTransport::new(http_config(&config.source))?),
            target: Arc::new(HttpTransport::new(target)?),
            metadata: Arc::new(HttpTransport::new(http_config(&config.source))?),
        })
    }
}

fn http_config(chain: &ChainConfig) -> HttpConfig {
    HttpConfig {
        connect_timeout: chain.connect_timeout.as_duration(),
        request_timeout: chain.request_timeout.as_duration(),
        ..Default::default()
    }
}

/// Health of both endpoint pools
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub source: HealthSummary,
    pub target: HealthSummary,
    pub mint_mode: MintMode,
}

impl EngineHealth {
    pub fn is_available(&self) -> bool {
        self.source.is_available() && self.target.is_available()
    }
}

pub struct Engine {
    config: Arc<Config>,
    source: Arc<ResilientClient>,
    target: Arc<ResilientClient>,
    store: Arc<dyn MigrationStore>,
    trees: Arc<TreeManager>,
    metrics: Arc<EngineMetrics>,
    orchestrator: Orchestrator,
    ledger: Option<FjallStore>,
}

impl Engine {
    /// Production wiring: fjall ledger, HTTP transports, archive on disk when configured
    pub fn open(config: Config) -> Result<Self, EngineError> {
        let ledger = FjallStore::open(&config.server.ledger_path)?;
        let store: Arc<dyn MigrationStore> = Arc::new(ledger.clone());
        let archive = match &config.server.archive_path {
            Some(path) => ExportArchive::local(path)?,
            None => ExportArchive::in_memory(),
        };
        let transports = Transports::http(&config)?;
        let mut engine = Self::assemble(config, store, transports, Some(archive));
        engine.ledger = Some(ledger);
        Ok(engine)
    }

    pub fn assemble(
        config: Config,
        store: Arc<dyn MigrationStore>,
        transports: Transports,
        archive: Option<ExportArchive>,
    ) -> Self {
        let source = Arc::new(ResilientClient::from_config(
            "source",
            &config.source,
            transports.source,
            HealthProbe::Get {
                path: SOURCE_PROBE_PATH.to_string(),
            },
        ));
        let target = Arc::new(ResilientClient::from_config(
            "target",
            &config.target,
            transports.target,
            HealthProbe::JsonRpc {
                method: TARGET_PROBE_METHOD.to_string(),
            },
        ));

        let chain: Arc<dyn TargetChain> = match config.mint.mode {
            MintMode::Live => Arc::new(RpcChain::new(target.clone())),
            MintMode::Simulated => Arc::new(SimulatedChain::new(config.mint.simulated_balance)),
        };
        let trees = Arc::new(TreeManager::from_config(chain, &config.mint));

        let exporter = Exporter::new(
            Arc::new(LcdQuerier::new(source.clone())),
            Arc::new(HttpMetadataFetcher::new(
                transports.metadata,
                config.export.ipfs_gateway.clone(),
                config.export.arweave_gateway.clone(),
            )),
            &config.export,
        );
        let mapper = Mapper::new(config.mapping.clone(), &config.export);
        let validator = Validator::new(
            store.clone(),
            config.validation.clone(),
            config.mapping.clone(),
        );
        let metrics = Arc::new(EngineMetrics::new());

        let pipeline = Pipeline::builder()
            .exporter(Arc::new(exporter))
            .mapper(Arc::new(mapper))
            .validator(Arc::new(validator))
            .trees(trees.clone())
            .store(store.clone())
            .maybe_archive(archive)
            .recipients(config.recipients.clone())
            .metrics(metrics.clone())
            .build();
        let orchestrator = Orchestrator::new(Arc::new(pipeline), &config.batch);

        info!(
            mode = ?config.mint.mode,
            source_endpoints = config.source.endpoints.len(),
            target_endpoints = config.target.endpoints.len(),
            batch_size = config.batch.batch_size,
            max_concurrent_batches = config.batch.max_concurrent_batches,
            "Engine assembled"
        );

        Self {
            config: Arc::new(config),
            source,
            target,
            store,
            trees,
            metrics,
            orchestrator,
            ledger: None,
        }
    }

    /// Sync the on-disk ledger, if any
    pub fn persist(&self) -> Result<(), EngineError> {
        if let Some(ledger) = &self.ledger {
            ledger.persist()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    pub fn trees(&self) -> &TreeManager {
        &self.trees
    }

    pub async fn health(&self) -> EngineHealth {
        let (source, target) = tokio::join!(self.source.check_health(), self.target.check_health());
        EngineHealth {
            source,
            target,
            mint_mode: self.trees.mode(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.failovers = self.source.failover_count() + self.target.failover_count();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::rpc::testing::FnTransport;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn config(mode: MintMode) -> Config {
        let mut config = Config::default();
        config.source.endpoints = vec![EndpointConfig {
            name: "lcd".into(),
            url: "http://lcd.test".into(),
            priority: 0,
        }];
        config.target.endpoints = vec![
            EndpointConfig {
                name: "primary".into(),
                url: "http://primary.test".into(),
                priority: 0,
            },
            EndpointConfig {
                name: "backup".into(),
                url: "http://backup.test".into(),
                priority: 1,
            },
        ];
        config.mint.mode = mode;
        config
    }

    fn transports(target: Arc<FnTransport>) -> Transports {
        let ok = Arc::new(FnTransport::new(|_, _| Ok(json!({"block": {}}))));
        Transports {
            source: ok.clone(),
            target,
            metadata: ok,
        }
    }

    #[tokio::test]
    async fn test_mode_selects_backend() {
        let target = Arc::new(FnTransport::new(|_, _| Ok(json!({"result": 1}))));

        let simulated = Engine::assemble(
            config(MintMode::Simulated),
            Arc::new(MemoryStore::new()),
            transports(target.clone()),
            None,
        );
        assert_eq!(simulated.trees().mode(), MintMode::Simulated);

        let live = Engine::assemble(
            config(MintMode::Live),
            Arc::new(MemoryStore::new()),
            transports(target),
            None,
        );
        assert_eq!(live.trees().mode(), MintMode::Live);
    }

    #[tokio::test]
    async fn test_health_and_failover_metrics() {
        let target = Arc::new(FnTransport::new(|url, _| {
            if url.starts_with("http://primary.test") {
                Err(TransportError::Timeout)
            } else {
                Ok(json!({"jsonrpc": "2.0", "id": 1, "result": 123}))
            }
        }));
        let engine = Engine::assemble(
            config(MintMode::Simulated),
            Arc::new(MemoryStore::new()),
            transports(target.clone()),
            None,
        );

        let slot = engine.target.call("getSlot", json!([])).await.unwrap();
        assert_eq!(slot, json!(123));
        assert_eq!(engine.metrics().failovers, 1);

        let health = engine.health().await;
        assert!(health.is_available());
        assert_eq!(health.target.unhealthy, 1);
        assert_eq!(health.target.healthy, 1);
        assert_eq!(health.source.healthy, 1);
        assert_eq!(health.mint_mode, MintMode::Simulated);
    }
}
