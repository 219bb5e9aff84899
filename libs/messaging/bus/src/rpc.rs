//! # Request/Reply RPC
//!
//! Methods are registered by name on the serving side (the controller) and
//! invoked with JSON parameters by clients (applications). Every method
//! answers with the same JSON shape:
//!
//! ```json
//! {"result": <any>, "error": ""}
//! ```
//!
//! A non-empty `error` means the call failed at the application level; the
//! `result` is then usually `false`.

use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Method names served by the controller
pub mod methods {
    pub const LIST_SWITCHES: &str = "list_switches";
    pub const WRITE_DPID: &str = "write_dpid";
    pub const WRITE_JSON: &str = "write_json";
}

/// `list_switches` result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchList {
    pub dpids: Vec<u64>,
}

/// `write_dpid` parameters: an already-encoded OpenFlow message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDpidParams {
    pub dpid: u64,
    pub payload: Vec<u8>,
}

/// `write_json` parameters: `msg` is `{"OFPName": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteJsonParams {
    pub dpid: u64,
    pub msg: Value,
}

/// RPC response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: Value,
    #[serde(default)]
    pub error: String,
}

impl RpcResponse {
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            result: result.into(),
            error: String::new(),
        }
    }

    /// Failed call: `result` is `false`
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            result: Value::Bool(false),
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    /// Parse a `{result, error}` object; both keys are required
    pub fn from_value(value: Value) -> BusResult<Self> {
        let obj = value.as_object().ok_or_else(|| {
            BusError::InvalidPayload("RPC response must be a JSON object".to_string())
        })?;
        if !obj.contains_key("result") || !obj.contains_key("error") {
            return Err(BusError::InvalidPayload(
                "The RPC dictionary must have both the 'result' and 'error' keys".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Server-side handler for one RPC method
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, params: Value) -> RpcResponse;
}

/// Adapter turning an async closure into an [`RpcHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> RpcHandler for FnHandler<F>
where
    F: Fn(Value) -> BoxFuture<'static, RpcResponse> + Send + Sync,
{
    async fn handle(&self, params: Value) -> RpcResponse {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F>(f: F) -> Arc<dyn RpcHandler>
where
    F: Fn(Value) -> BoxFuture<'static, RpcResponse> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Name to handler map
#[derive(Default)]
pub struct RpcRegistry {
    methods: DashMap<String, Arc<dyn RpcHandler>>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, handler: Arc<dyn RpcHandler>) -> BusResult<()> {
        match self.methods.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BusError::DuplicateMethod(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                debug!("Registered RPC method {}", name);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> BusResult<Arc<dyn RpcHandler>> {
        self.methods
            .get(name)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| BusError::UnknownMethod(name.to_string()))
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
