use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mintbridge::archive::ExportArchive;
use mintbridge::config::{Config, EndpointConfig, RetryConfig};
use mintbridge::engine::{Engine, Transports};
use mintbridge::humanize::HumanDuration;
use mintbridge::mint::TreeParams;
use mintbridge::models::{JobStatus, RecordStatus};
use mintbridge::orchestrator::RunOptions;
use mintbridge::store::MemoryStore;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const CONTRACT: &str = "sei1forestcontract0000000000000000000000";
const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
/// Served with a 404 so the exporter falls back to the on-chain extension
const MISSING_METADATA: &str = "004";

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn token_id(i: u32) -> String {
    format!("{:03}", i)
}

fn owner(id: &str) -> String {
    format!("sei1qy352eufqy352eufqy352eufqy352euf{}", id)
}

/// Off-chain metadata documents, one per token
async fn metadata_server() -> String {
    let router = Router::new().route(
        "/meta/{id}",
        get(|Path(id): Path<String>| async move {
            if id == MISSING_METADATA {
                return StatusCode::NOT_FOUND.into_response();
            }
            Json(json!({
                "name": format!("Birch #{}", id),
                "description": "A white birch",
                "image": format!("ipfs://QmBirch{}", id),
                "attributes": [{"trait_type": "Species", "value": "Birch"}]
            }))
            .into_response()
        }),
    );
    serve(router).await
}

#[derive(Clone)]
struct Lcd {
    tokens: u32,
    metadata: String,
}

/// Cosmos LCD answering CW721 smart queries for one contract
async fn lcd_server(tokens: u32, metadata: String) -> String {
    let router = Router::new()
        .route(
            "/cosmwasm/wasm/v1/contract/{contract}/smart/{query}",
            get(smart_query),
        )
        .route(
            "/cosmos/base/tendermint/v1beta1/blocks/latest",
            get(|| async { Json(json!({"block": {"header": {"height": "1"}}})) }),
        )
        .with_state(Lcd { tokens, metadata });
    serve(router).await
}

async fn smart_query(
    State(lcd): State<Lcd>,
    Path((contract, query)): Path<(String, String)>,
) -> Response {
    if contract != CONTRACT {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Ok(bytes) = STANDARD.decode(query.as_bytes()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(query) = serde_json::from_slice::<Value>(&bytes) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let data = if query.get("contract_info").is_some() {
        json!({"name": "Forest", "symbol": "FRST"})
    } else if let Some(all) = query.get("all_tokens") {
        let start = all["start_after"]
            .as_str()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let limit = all["limit"].as_u64().unwrap_or(10) as u32;
        let tokens: Vec<String> = (start + 1..=lcd.tokens).take(limit as usize).map(token_id).collect();
        json!({"tokens": tokens})
    } else if let Some(info) = query.get("nft_info") {
        let id = info["token_id"].as_str().unwrap_or_default();
        json!({
            "token_uri": format!("{}/meta/{}", lcd.metadata, id),
            "extension": {"name": format!("Oak #{}", id), "image": format!("ipfs://Qm{}", id)}
        })
    } else if let Some(owner_of) = query.get("owner_of") {
        let id = owner_of["token_id"].as_str().unwrap_or_default();
        json!({"owner": owner(id), "approvals": []})
    } else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    Json(json!({"data": data})).into_response()
}

/// Solana JSON-RPC node; only the health probe reaches it in simulated mode
async fn target_server() -> String {
    let router = Router::new().route(
        "/",
        post(|Json(body): Json<Value>| async move {
            Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": 4242}))
        }),
    );
    serve(router).await
}

async fn engine(tokens: u32, configure: impl FnOnce(&mut Config)) -> Engine {
    let metadata = metadata_server().await;
    let lcd = lcd_server(tokens, metadata).await;
    let target = target_server().await;

    let mut config = Config::default();
    config.source.endpoints = vec![EndpointConfig {
        name: "lcd".into(),
        url: lcd,
        priority: 0,
    }];
    config.target.endpoints = vec![EndpointConfig {
        name: "rpc".into(),
        url: target,
        priority: 0,
    }];
    for chain in [&mut config.source, &mut config.target] {
        chain.retry = RetryConfig {
            max_attempts: 2,
            base_delay: HumanDuration::from_millis(5),
        };
    }
    config.export.page_size = 4;
    config.export.page_delay = HumanDuration::from_millis(0);
    config.recipients.fallback = Some(RECIPIENT.to_string());
    configure(&mut config);

    let transports = Transports::http(&config).unwrap();
    Engine::assemble(
        config,
        Arc::new(MemoryStore::new()),
        transports,
        Some(ExportArchive::in_memory()),
    )
}

#[tokio::test]
async fn test_migrates_collection_over_http() {
    let engine = engine(6, |config| {
        // Token 006 has no mapped recipient
        config.recipients.fallback = None;
        for i in 1..=5 {
            let id = token_id(i);
            config.recipients.owners.insert(owner(&id), RECIPIENT.to_string());
        }
    })
    .await;

    let health = engine.health().await;
    assert!(health.is_available());

    let report = engine
        .orchestrator()
        .migrate("forest", vec![CONTRACT.to_string()], &CancellationToken::new(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.job.status, JobStatus::Completed);
    assert!(report.progress.is_none());

    let records = engine.store().list_records(report.job.id).await.unwrap();
    assert_eq!(records.len(), 6);

    let completed: Vec<_> = records
        .iter()
        .filter(|r| r.status == RecordStatus::Completed)
        .collect();
    assert_eq!(completed.len(), 5);
    assert!(completed.iter().all(|r| r.asset_id.is_some() && r.recipient.as_deref() == Some(RECIPIENT)));

    let unmapped = records.iter().find(|r| r.source_token_id == "006").unwrap();
    assert_eq!(unmapped.status, RecordStatus::Failed);
    assert!(unmapped.asset_id.is_none());

    let by_id = |id: &str| records.iter().find(|r| r.source_token_id == id).unwrap();
    let off_chain = by_id("001").target_metadata.as_ref().unwrap();
    assert_eq!(off_chain.name, "Birch #001");
    let on_chain = by_id(MISSING_METADATA).target_metadata.as_ref().unwrap();
    assert_eq!(on_chain.name, "Oak #004");

    let metrics = engine.metrics();
    assert_eq!(metrics.records_exported, 6);
    assert_eq!(metrics.mints_succeeded, 5);
    assert_eq!(metrics.validations_failed, 1);
    assert_eq!(metrics.jobs_completed, 1);
    assert_eq!(metrics.failovers, 0);
}

#[tokio::test]
async fn test_large_collection_runs_in_batches_across_trees() {
    let engine = engine(11, |config| {
        config.batch.batch_size = 3;
        config.batch.max_concurrent_batches = 2;
        config.mint.default_tree = TreeParams {
            max_depth: 3,
            max_buffer_size: 8,
            canopy_depth: 0,
        };
    })
    .await;

    let report = engine
        .orchestrator()
        .migrate("forest", vec![CONTRACT.to_string()], &CancellationToken::new(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.job.status, JobStatus::Completed);

    let progress = report.progress.unwrap();
    assert_eq!(progress.total, 11);
    assert_eq!(progress.succeeded, 11);
    assert_eq!(progress.batches_done, 4);

    let records = engine.store().list_records(report.job.id).await.unwrap();
    let leaves: HashSet<_> = records
        .iter()
        .map(|r| (r.tree_address.clone().unwrap(), r.leaf_index.unwrap()))
        .collect();
    assert_eq!(leaves.len(), 11);

    let trees = engine.trees().trees().await;
    assert_eq!(trees.len(), 2);
    assert_eq!(trees.iter().map(|t| t.current_size).sum::<u64>(), 11);
}

#[tokio::test]
async fn test_second_job_reuses_completed_mints() {
    let engine = engine(3, |_| {}).await;
    let orchestrator = engine.orchestrator();
    let cancel = CancellationToken::new();

    let first = orchestrator
        .migrate("first", vec![CONTRACT.to_string()], &cancel, RunOptions::default())
        .await
        .unwrap();
    let second = orchestrator
        .migrate("second", vec![CONTRACT.to_string()], &cancel, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(second.job.status, JobStatus::Completed);

    let assets = |records: Vec<mintbridge::models::MigrationRecord>| {
        records
            .into_iter()
            .map(|r| (r.source_token_id, r.asset_id))
            .collect::<std::collections::BTreeMap<_, _>>()
    };
    let store = engine.store();
    assert_eq!(
        assets(store.list_records(first.job.id).await.unwrap()),
        assets(store.list_records(second.job.id).await.unwrap())
    );

    let minted: u64 = engine.trees().trees().await.iter().map(|t| t.current_size).sum();
    assert_eq!(minted, 3);
}
