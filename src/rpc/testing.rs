//! Scripted transport for unit tests

use super::transport::{Result, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

type Handler = dyn Fn(&str, Option<&Value>) -> Result<Value> + Send + Sync;

/// Transport answering every request through a closure of `(url, body)`
pub struct FnTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<String>>,
}

impl FnTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Urls requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for FnTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        self.calls.lock().push(url.to_string());
        (self.handler)(url, Some(body))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        self.calls.lock().push(url.to_string());
        (self.handler)(url, None)
    }
}
