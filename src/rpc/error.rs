use super::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("endpoint '{endpoint}' timed out")]
    Timeout { endpoint: String },

    #[error("endpoint '{endpoint}' unreachable: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("endpoint '{endpoint}' rate limited the request (HTTP 429)")]
    RateLimited { endpoint: String },

    #[error("endpoint '{endpoint}' returned HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("endpoint '{endpoint}' returned a malformed response: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("no RPC endpoints available")]
    NoEndpoints,
}

pub type Result<T> = std::result::Result<T, RpcError>;

impl RpcError {
    pub fn from_transport(endpoint: &str, err: TransportError) -> Self {
        let endpoint = endpoint.to_string();
        match err {
            TransportError::Timeout => RpcError::Timeout { endpoint },
            TransportError::Connection(reason) | TransportError::InvalidRequest(reason) => {
                RpcError::Connection { endpoint, reason }
            }
            TransportError::Status { status: 429 } => RpcError::RateLimited { endpoint },
            TransportError::Status { status } => RpcError::HttpStatus { endpoint, status },
            TransportError::Decode(reason) => RpcError::Malformed { endpoint, reason },
        }
    }

    /// Transient classes: timeouts, connection failures, 429 and 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Timeout { .. } | RpcError::Connection { .. } | RpcError::RateLimited { .. } => {
                true
            }
            RpcError::HttpStatus { status, .. } => *status >= 500,
            RpcError::Malformed { .. } | RpcError::Rpc { .. } | RpcError::NoEndpoints => false,
        }
    }

    /// Whether the failure is attributed to the endpoint (counts against it, triggers failover)
    pub fn is_endpoint_fault(&self) -> bool {
        !matches!(self, RpcError::Rpc { .. } | RpcError::NoEndpoints)
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Timeout { endpoint }
            | RpcError::Connection { endpoint, .. }
            | RpcError::RateLimited { endpoint }
            | RpcError::HttpStatus { endpoint, .. }
            | RpcError::Malformed { endpoint, .. } => Some(endpoint),
            RpcError::Rpc { .. } | RpcError::NoEndpoints => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        let ep = "a";
        assert!(RpcError::from_transport(ep, TransportError::Timeout).is_retryable());
        assert!(RpcError::from_transport(ep, TransportError::Connection("refused".into())).is_retryable());
        assert!(RpcError::from_transport(ep, TransportError::Status { status: 429 }).is_retryable());
        assert!(RpcError::from_transport(ep, TransportError::Status { status: 503 }).is_retryable());

        assert!(!RpcError::from_transport(ep, TransportError::Status { status: 404 }).is_retryable());
        assert!(!RpcError::from_transport(ep, TransportError::Decode("eof".into())).is_retryable());
        assert!(!RpcError::Rpc { code: -32602, message: "invalid params".into() }.is_retryable());
    }

    #[test]
    fn test_rate_limit_is_distinct() {
        let err = RpcError::from_transport("a", TransportError::Status { status: 429 });
        assert!(matches!(err, RpcError::RateLimited { .. }));
        assert_eq!(err.endpoint(), Some("a"));
    }

    #[test]
    fn test_application_errors_are_not_endpoint_faults() {
        assert!(!RpcError::Rpc { code: -32000, message: "x".into() }.is_endpoint_fault());
        assert!(RpcError::HttpStatus { endpoint: "a".into(), status: 404 }.is_endpoint_fault());
    }
}
