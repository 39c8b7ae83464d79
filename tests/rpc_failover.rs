use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mintbridge::config::{ChainConfig, EndpointConfig, HealthProbe, RetryConfig};
use mintbridge::humanize::HumanDuration;
use mintbridge::rpc::{HttpConfig, HttpTransport, ResilientClient, RpcError};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

impl Hits {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Answers every JSON-RPC request with HTTP 503
async fn broken_node(hits: Hits) -> String {
    let router = Router::new()
        .route(
            "/",
            post(|State(hits): State<Hits>| async move {
                hits.0.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }),
        )
        .with_state(hits);
    serve(router).await
}

/// Serves `getSlot`, rejects `sendTransaction`, echoes anything else
async fn healthy_node(hits: Hits) -> String {
    let router = Router::new()
        .route(
            "/",
            post(|State(hits): State<Hits>, Json(body): Json<Value>| async move {
                hits.0.fetch_add(1, Ordering::SeqCst);
                match body["method"].as_str() {
                    Some("getSlot") => Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": 4242})),
                    Some("sendTransaction") => Json(json!({
                        "jsonrpc": "2.0",
                        "id": body["id"],
                        "error": {"code": -32002, "message": "Transaction simulation failed"}
                    })),
                    _ => Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": body["method"]})),
                }
            }),
        )
        .with_state(hits);
    serve(router).await
}

fn chain(endpoints: Vec<(&str, String, u32)>, max_attempts: u32) -> ChainConfig {
    ChainConfig {
        endpoints: endpoints
            .into_iter()
            .map(|(name, url, priority)| EndpointConfig {
                name: name.to_string(),
                url,
                priority,
            })
            .collect(),
        failure_threshold: 1,
        retry: RetryConfig {
            max_attempts,
            base_delay: HumanDuration::from_millis(5),
        },
        ..Default::default()
    }
}

fn client(config: &ChainConfig) -> ResilientClient {
    let transport = HttpTransport::new(HttpConfig {
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();
    ResilientClient::from_config(
        "target",
        config,
        Arc::new(transport),
        HealthProbe::JsonRpc {
            method: "getSlot".to_string(),
        },
    )
}

#[tokio::test]
async fn test_fails_over_to_backup_endpoint() {
    let broken_hits = Hits::default();
    let healthy_hits = Hits::default();
    let primary = broken_node(broken_hits.clone()).await;
    let backup = healthy_node(healthy_hits.clone()).await;

    let client = client(&chain(vec![("primary", primary, 0), ("backup", backup, 1)], 3));

    let slot = client.call("getSlot", json!([])).await.unwrap();
    assert_eq!(slot, json!(4242));
    assert_eq!(client.failover_count(), 1);
    assert_eq!(broken_hits.count(), 1);
    assert_eq!(healthy_hits.count(), 1);

    // The second failure crosses the threshold; the primary is skipped afterwards
    client.call("getSlot", json!([])).await.unwrap();
    client.call("getSlot", json!([])).await.unwrap();
    assert_eq!(broken_hits.count(), 2);
    assert_eq!(healthy_hits.count(), 3);
}

#[tokio::test]
async fn test_application_errors_do_not_fail_over() {
    let hits = Hits::default();
    let backup_hits = Hits::default();
    let primary = healthy_node(hits.clone()).await;
    let backup = healthy_node(backup_hits.clone()).await;

    let client = client(&chain(vec![("primary", primary, 0), ("backup", backup, 1)], 3));

    let err = client
        .call("sendTransaction", json!(["AQID"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Rpc { code: -32002, .. }));
    assert_eq!(hits.count(), 1);
    assert_eq!(backup_hits.count(), 0);
    assert_eq!(client.failover_count(), 0);
}

#[tokio::test]
async fn test_retries_until_attempts_exhausted() {
    let hits = Hits::default();
    let only = broken_node(hits.clone()).await;

    let mut config = chain(vec![("only", only, 0)], 3);
    config.failure_threshold = 100;
    let client = client(&config);

    let err = client.call("getSlot", json!([])).await.unwrap_err();
    assert!(matches!(err, RpcError::HttpStatus { status: 503, .. }));
    assert_eq!(hits.count(), 3);
}

#[tokio::test]
async fn test_health_check_classifies_endpoints() {
    let dead = dead_url().await;
    let broken = broken_node(Hits::default()).await;
    let backup = healthy_node(Hits::default()).await;
    let client = client(&chain(
        vec![("dead", dead, 0), ("broken", broken, 0), ("backup", backup, 1)],
        1,
    ));

    let summary = client.force_health_check().await;
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.unhealthy, 1);
    assert!(summary.is_available());
    assert!(!summary.cached);

    // Within the interval the cached summary is returned
    let cached = client.check_health().await;
    assert!(cached.cached);

    // Healthy endpoints are preferred over degraded ones regardless of priority
    assert_eq!(client.call("getSlot", json!([])).await.unwrap(), json!(4242));
    assert_eq!(client.failover_count(), 0);
}

#[tokio::test]
async fn test_unreachable_pool_reports_no_endpoints() {
    let mut config = chain(vec![("dead", dead_url().await, 0)], 1);
    config.failure_threshold = 0;
    let client = client(&config);

    let first = client.call("getSlot", json!([])).await.unwrap_err();
    assert!(matches!(first, RpcError::Connection { .. } | RpcError::Timeout { .. }));

    // The pool is empty of usable endpoints; a fresh probe cannot revive it
    let second = client.call("getSlot", json!([])).await.unwrap_err();
    assert!(matches!(second, RpcError::NoEndpoints));
}

/// An address nothing listens on
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}
