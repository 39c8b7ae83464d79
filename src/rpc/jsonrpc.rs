//! JSON-RPC 2.0 envelope

use super::error::{Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

/// `{"jsonrpc":"2.0","id":<id>,"method":<name>,"params":[...]}`
pub fn request(id: u64, method: &str, params: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Extract `result`, or map `error:{code,message}` to [`RpcError::Rpc`]
pub fn parse_response(endpoint: &str, body: Value) -> Result<Value> {
    let response: JsonRpcResponse =
        serde_json::from_value(body).map_err(|e| RpcError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    Ok(response.result)
}
