//! Endpoint pool with health state and priority selection

use crate::config::{ChainConfig, EndpointConfig};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// One RPC endpoint and its running statistics
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    pub priority: u32,
    pub status: EndpointStatus,
    pub success_count: u64,
    pub error_count: u64,
    pub last_response_ms: Option<u64>,
    pub last_check_time: Option<DateTime<Utc>>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority,
            status: EndpointStatus::Unknown,
            success_count: 0,
            error_count: 0,
            last_response_ms: None,
            last_check_time: None,
        }
    }

    /// successes / (successes + errors); 1.0 before any call
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    fn is_preferred(&self) -> bool {
        matches!(self.status, EndpointStatus::Healthy | EndpointStatus::Unknown)
    }
}

impl From<&EndpointConfig> for Endpoint {
    fn from(config: &EndpointConfig) -> Self {
        Endpoint::new(&config.name, &config.url, config.priority)
    }
}

/// Result of probing one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Probe succeeded within the timeout
    Healthy(Duration),
    /// Endpoint answered, but not successfully
    Degraded,
    /// Timeout or connection failure
    Unreachable,
}

/// Shared, concurrently updated set of endpoints for one chain
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: RwLock<Vec<Endpoint>>,
    failure_threshold: u64,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<Endpoint>, failure_threshold: u64) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
            failure_threshold,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            config.endpoints.iter().map(Endpoint::from).collect(),
            config.failure_threshold,
        )
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Endpoint> {
        self.endpoints.read().iter().find(|e| e.name == name).cloned()
    }

    /// Best endpoint: Healthy/Unknown first, Degraded only when nothing else is left.
    /// Ordered by priority ascending, then success rate descending.
    pub fn select(&self) -> Option<Endpoint> {
        self.select_excluding(&[])
    }

    pub fn select_excluding(&self, excluded: &[&str]) -> Option<Endpoint> {
        let endpoints = self.endpoints.read();
        let candidates = || {
            endpoints
                .iter()
                .filter(|e| !excluded.contains(&e.name.as_str()))
        };

        let preferred = candidates().filter(|e| e.is_preferred()).min_by(|a, b| rank(a, b));
        preferred
            .or_else(|| {
                candidates()
                    .filter(|e| e.status == EndpointStatus::Degraded)
                    .min_by(|a, b| rank(a, b))
            })
            .cloned()
    }

    pub fn record_success(&self, name: &str, elapsed: Duration) {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.name == name) {
            endpoint.success_count += 1;
            endpoint.last_response_ms = Some(elapsed.as_millis() as u64);
            if endpoint.status == EndpointStatus::Unknown {
                endpoint.status = EndpointStatus::Healthy;
            }
        }
    }

    /// Count a failure; the endpoint turns Unhealthy once its error count exceeds the threshold
    pub fn record_failure(&self, name: &str) -> Option<EndpointStatus> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints.iter_mut().find(|e| e.name == name)?;

        endpoint.error_count += 1;
        if endpoint.error_count > self.failure_threshold
            && endpoint.status != EndpointStatus::Unhealthy
        {
            warn!(
                endpoint = %endpoint.name,
                error_count = endpoint.error_count,
                threshold = self.failure_threshold,
                "Endpoint marked unhealthy"
            );
            endpoint.status = EndpointStatus::Unhealthy;
        }

        Some(endpoint.status)
    }

    /// Apply a health probe result
    pub fn record_probe(&self, name: &str, outcome: ProbeOutcome) {
        let mut endpoints = self.endpoints.write();
        let Some(endpoint) = endpoints.iter_mut().find(|e| e.name == name) else {
            return;
        };

        let previous = endpoint.status;
        endpoint.last_check_time = Some(Utc::now());

        match outcome {
            ProbeOutcome::Healthy(elapsed) => {
                endpoint.status = EndpointStatus::Healthy;
                endpoint.last_response_ms = Some(elapsed.as_millis() as u64);
            }
            ProbeOutcome::Degraded => {
                endpoint.status = EndpointStatus::Degraded;
            }
            ProbeOutcome::Unreachable => {
                endpoint.error_count += 1;
                endpoint.status = EndpointStatus::Unhealthy;
            }
        }

        if previous != endpoint.status {
            info!(
                endpoint = %endpoint.name,
                from = ?previous,
                to = ?endpoint.status,
                "Endpoint status changed"
            );
        }
    }
}

fn rank(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.priority.cmp(&b.priority).then_with(|| {
        b.success_rate()
            .partial_cmp(&a.success_rate())
            .unwrap_or(Ordering::Equal)
    })
}
