//! Resilient RPC client: endpoint selection, single failover, retry with backoff

use super::endpoint::{Endpoint, EndpointPool, EndpointStatus, ProbeOutcome};
use super::error::{Result, RpcError};
use super::jsonrpc;
use super::retry::RetryPolicy;
use super::transport::{Transport, join_url};
use crate::config::{ChainConfig, HealthProbe};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Aggregated pool health after a check
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub chain: String,
    pub checked_at: DateTime<Utc>,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub endpoints: Vec<Endpoint>,
    /// True when served from the rate-limited cache
    pub cached: bool,
}

impl HealthSummary {
    fn from_endpoints(chain: &str, endpoints: Vec<Endpoint>) -> Self {
        let count = |status| endpoints.iter().filter(|e| e.status == status).count();
        Self {
            chain: chain.to_string(),
            checked_at: Utc::now(),
            healthy: count(EndpointStatus::Healthy),
            degraded: count(EndpointStatus::Degraded),
            unhealthy: count(EndpointStatus::Unhealthy),
            unknown: count(EndpointStatus::Unknown),
            endpoints,
            cached: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.healthy + self.degraded + self.unknown > 0
    }
}

enum Request<'a> {
    JsonRpc { method: &'a str, params: &'a Value },
    Get { path: &'a str },
}

impl Request<'_> {
    fn label(&self) -> &str {
        match self {
            Request::JsonRpc { method, .. } => method,
            Request::Get { path } => path,
        }
    }
}

/// RPC client over an endpoint pool
///
/// Each attempt selects the best endpoint and fails over at most once to the
/// next best; retryable failures are retried with exponential backoff.
pub struct ResilientClient {
    chain: String,
    pool: Arc<EndpointPool>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    probe: HealthProbe,
    health_interval: Duration,
    last_health: Mutex<Option<(Instant, HealthSummary)>>,
    next_id: AtomicU64,
    failovers: AtomicU64,
}

impl ResilientClient {
    pub fn new(
        chain: impl Into<String>,
        pool: Arc<EndpointPool>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        probe: HealthProbe,
        health_interval: Duration,
    ) -> Self {
        Self {
            chain: chain.into(),
            pool,
            transport,
            retry,
            probe,
            health_interval,
            last_health: Mutex::new(None),
            next_id: AtomicU64::new(1),
            failovers: AtomicU64::new(0),
        }
    }

    /// Build from chain configuration; `default_probe` applies when none is configured
    pub fn from_config(
        chain: impl Into<String>,
        config: &ChainConfig,
        transport: Arc<dyn Transport>,
        default_probe: HealthProbe,
    ) -> Self {
        Self::new(
            chain,
            Arc::new(EndpointPool::from_config(config)),
            transport,
            RetryPolicy::from_config(&config.retry),
            config.health_probe.clone().unwrap_or(default_probe),
            config.health_check_interval.as_duration(),
        )
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn failover_count(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    /// JSON-RPC call with failover and retry
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = Request::JsonRpc {
            method,
            params: &params,
        };
        self.retry.run(method, || self.execute(&request)).await
    }

    /// JSON-RPC call sent to exactly one endpoint; for methods that are not
    /// safe to repeat once the node may have executed them
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let request = Request::JsonRpc {
            method,
            params: &params,
        };
        let endpoint = self.select_endpoint().await?;
        self.attempt(&endpoint, &request).await
    }

    /// REST GET relative to the endpoint url, with failover and retry
    pub async fn get(&self, path: &str) -> Result<Value> {
        let request = Request::Get { path };
        self.retry.run(path, || self.execute(&request)).await
    }

    async fn execute(&self, request: &Request<'_>) -> Result<Value> {
        let primary = self.select_endpoint().await?;

        match self.attempt(&primary, request).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_endpoint_fault() => {
                let Some(fallback) = self.pool.select_excluding(&[primary.name.as_str()]) else {
                    return Err(err);
                };

                self.failovers.fetch_add(1, Ordering::Relaxed);
                warn!(
                    chain = %self.chain,
                    from = %primary.name,
                    to = %fallback.name,
                    request = request.label(),
                    error = %err,
                    "Failing over to next endpoint"
                );
                self.attempt(&fallback, request).await
            }
            Err(err) => Err(err),
        }
    }

    async fn select_endpoint(&self) -> Result<Endpoint> {
        if self.pool.is_empty() {
            return Err(RpcError::NoEndpoints);
        }

        if let Some(endpoint) = self.pool.select() {
            return Ok(endpoint);
        }

        // Every endpoint is unhealthy; a fresh probe may bring some back
        self.check_health().await;
        self.pool.select().ok_or(RpcError::NoEndpoints)
    }

    async fn attempt(&self, endpoint: &Endpoint, request: &Request<'_>) -> Result<Value> {
        let started = Instant::now();
        let result = self.send(endpoint, request).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => self.pool.record_success(&endpoint.name, elapsed),
            // The endpoint answered; the call itself was rejected
            Err(RpcError::Rpc { .. }) => self.pool.record_success(&endpoint.name, elapsed),
            Err(err) => {
                debug!(chain = %self.chain, endpoint = %endpoint.name, error = %err, "Endpoint call failed");
                self.pool.record_failure(&endpoint.name);
            }
        }

        result
    }

    async fn send(&self, endpoint: &Endpoint, request: &Request<'_>) -> Result<Value> {
        match request {
            Request::JsonRpc { method, params } => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let body = jsonrpc::request(id, method, params);
                let response = self
                    .transport
                    .post_json(&endpoint.url, &body)
                    .await
                    .map_err(|e| RpcError::from_transport(&endpoint.name, e))?;
                jsonrpc::parse_response(&endpoint.name, response)
            }
            Request::Get { path } => self
                .transport
                .get_json(&join_url(&endpoint.url, path))
                .await
                .map_err(|e| RpcError::from_transport(&endpoint.name, e)),
        }
    }

    /// Probe every endpoint, at most once per health check interval
    pub async fn check_health(&self) -> HealthSummary {
        let mut last = self.last_health.lock().await;

        if let Some((at, summary)) = last.as_ref() {
            if at.elapsed() < self.health_interval {
                let mut summary = summary.clone();
                summary.cached = true;
                return summary;
            }
        }

        let summary = self.probe_all().await;
        *last = Some((Instant::now(), summary.clone()));
        summary
    }

    /// Probe every endpoint now, ignoring the interval
    pub async fn force_health_check(&self) -> HealthSummary {
        let mut last = self.last_health.lock().await;
        let summary = self.probe_all().await;
        *last = Some((Instant::now(), summary.clone()));
        summary
    }

    async fn probe_all(&self) -> HealthSummary {
        let endpoints = self.pool.snapshot();
        let outcomes =
            futures_util::future::join_all(endpoints.iter().map(|e| self.probe(e))).await;

        for (endpoint, outcome) in endpoints.iter().zip(outcomes) {
            self.pool.record_probe(&endpoint.name, outcome);
        }

        let summary = HealthSummary::from_endpoints(&self.chain, self.pool.snapshot());
        debug!(
            chain = %self.chain,
            healthy = summary.healthy,
            degraded = summary.degraded,
            unhealthy = summary.unhealthy,
            "Health check complete"
        );
        summary
    }

    async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let empty = Value::Array(Vec::new());
        let request = match &self.probe {
            HealthProbe::JsonRpc { method } => Request::JsonRpc {
                method,
                params: &empty,
            },
            HealthProbe::Get { path } => Request::Get { path },
        };

        let started = Instant::now();
        match self.send(endpoint, &request).await {
            Ok(_) => ProbeOutcome::Healthy(started.elapsed()),
            Err(RpcError::Timeout { .. }) | Err(RpcError::Connection { .. }) => {
                ProbeOutcome::Unreachable
            }
            Err(_) => ProbeOutcome::Degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::FnTransport;
    use crate::rpc::transport::TransportError;
    use serde_json::json;

    fn client(transport: Arc<FnTransport>, threshold: u64) -> ResilientClient {
        let pool = EndpointPool::new(
            vec![
                Endpoint::new("primary", "http://primary", 0),
                Endpoint::new("backup", "http://backup", 1),
            ],
            threshold,
        );
        ResilientClient::new(
            "target",
            Arc::new(pool),
            transport,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            HealthProbe::JsonRpc {
                method: "getSlot".to_string(),
            },
            Duration::from_secs(60),
        )
    }

    fn ok(result: Value) -> std::result::Result<Value, TransportError> {
        Ok(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    #[tokio::test]
    async fn test_call_uses_primary() {
        let transport = Arc::new(FnTransport::new(|_, _| ok(json!(7))));
        let client = client(transport.clone(), 5);

        let result = client.call("getSlot", json!([])).await.unwrap();

        assert_eq!(result, json!(7));
        assert_eq!(transport.calls(), vec!["http://primary".to_string()]);
        assert_eq!(client.pool().get("primary").unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_fails_over_once_within_attempt() {
        let transport = Arc::new(FnTransport::new(|url, _| {
            if url.contains("primary") {
                Err(TransportError::Status { status: 503 })
            } else {
                ok(json!("from-backup"))
            }
        }));
        let client = client(transport.clone(), 5);

        let result = client.call("getSlot", json!([])).await.unwrap();

        assert_eq!(result, json!("from-backup"));
        assert_eq!(client.failover_count(), 1);
        assert_eq!(client.pool().get("primary").unwrap().error_count, 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_with_last_error() {
        let transport = Arc::new(FnTransport::new(|_, _| Err(TransportError::Timeout)));
        let client = client(transport.clone(), 100);

        let err = client.call("getSlot", json!([])).await.unwrap_err();

        assert!(matches!(err, RpcError::Timeout { .. }));
        // 3 attempts, each primary + one failover
        assert_eq!(transport.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_call_once_neither_retries_nor_fails_over() {
        let transport = Arc::new(FnTransport::new(|_, _| Err(TransportError::Timeout)));
        let client = client(transport.clone(), 100);

        let err = client.call_once("sendTransaction", json!(["AQID"])).await.unwrap_err();

        assert!(matches!(err, RpcError::Timeout { .. }));
        assert_eq!(transport.calls(), vec!["http://primary".to_string()]);
        assert_eq!(client.failover_count(), 0);
        assert_eq!(client.pool().get("primary").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_application_error_not_retried_or_counted() {
        let transport = Arc::new(FnTransport::new(|_, _| {
            Ok(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "bad"}}))
        }));
        let client = client(transport.clone(), 5);

        let err = client.call("getBalance", json!(["x"])).await.unwrap_err();

        assert!(matches!(err, RpcError::Rpc { code: -32602, .. }));
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(client.pool().get("primary").unwrap().error_count, 0);
        assert_eq!(client.failover_count(), 0);
    }

    #[tokio::test]
    async fn test_no_endpoints_fails_fast() {
        let transport = Arc::new(FnTransport::new(|_, _| ok(json!(1))));
        let client = ResilientClient::new(
            "source",
            Arc::new(EndpointPool::new(Vec::new(), 5)),
            transport.clone(),
            RetryPolicy::default(),
            HealthProbe::Get { path: "/status".into() },
            Duration::from_secs(60),
        );

        assert!(matches!(client.get("/x").await, Err(RpcError::NoEndpoints)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_classifies_and_caches() {
        let transport = Arc::new(FnTransport::new(|url, _| {
            if url.contains("primary") {
                Err(TransportError::Status { status: 500 })
            } else {
                Err(TransportError::Connection("refused".into()))
            }
        }));
        let client = client(transport.clone(), 5);

        let summary = client.check_health().await;
        assert!(!summary.cached);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.unhealthy, 1);
        assert_eq!(transport.calls().len(), 2);

        let again = client.check_health().await;
        assert!(again.cached);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_restores_unhealthy_pool() {
        let transport = Arc::new(FnTransport::new(|_, _| ok(json!(1))));
        let client = client(transport.clone(), 0);
        client.pool().record_failure("primary");
        client.pool().record_failure("backup");
        assert!(client.pool().select().is_none());

        let result = client.call("getSlot", json!([])).await.unwrap();

        assert_eq!(result, json!(1));
        assert_eq!(
            client.pool().get("primary").unwrap().status,
            EndpointStatus::Healthy
        );
    }
}
