//! Chain RPC access
//!
//! A [`ResilientClient`] wraps a pool of endpoints for one chain. Calls go to
//! the best available endpoint (priority, then success rate), fail over once
//! to the next best on endpoint faults, and are retried with exponential
//! backoff while the failure stays transient (timeout, connection, 429, 5xx).

mod client;
mod endpoint;
mod error;
pub mod jsonrpc;
mod retry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{HealthSummary, ResilientClient};
pub use endpoint::{Endpoint, EndpointPool, EndpointStatus, ProbeOutcome};
pub use error::{Result, RpcError};
pub use retry::RetryPolicy;
pub use transport::{HttpConfig, HttpTransport, Transport, TransportError, join_url};
