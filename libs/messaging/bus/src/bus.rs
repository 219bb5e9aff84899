//! The [`EventBus`] seam between the controller, applications and whatever
//! carries events between them.

use crate::error::BusResult;
use crate::event::BusEvent;
use crate::rpc::{RpcHandler, RpcResponse};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Topic publish/subscribe plus request/reply RPC
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `payload` under `routing_key`; returns the number of subscribers reached
    async fn publish(&self, routing_key: &str, payload: Bytes) -> BusResult<usize>;

    /// Publish a JSON document
    async fn publish_json(&self, routing_key: &str, payload: &Value) -> BusResult<usize> {
        let bytes = serde_json::to_vec(payload)?;
        self.publish(routing_key, Bytes::from(bytes)).await
    }

    /// Bind a named queue to one or more topic patterns
    fn subscribe(&self, name: &str, patterns: &[&str]) -> BusResult<Subscription>;

    fn unsubscribe(&self, name: &str) -> BusResult<()>;

    /// Serve an RPC method; names are unique per bus
    fn register_method(&self, name: &str, handler: Arc<dyn RpcHandler>) -> BusResult<()>;

    fn unregister_method(&self, name: &str) -> bool;

    /// Invoke an RPC method, bounded by the bus's RPC timeout
    async fn call(&self, method: &str, params: Value) -> BusResult<RpcResponse>;
}

/// Receiving end of a named subscription
#[derive(Debug)]
pub struct Subscription {
    name: String,
    rx: mpsc::Receiver<BusEvent>,
}

impl Subscription {
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<BusEvent>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event; `None` once the bus dropped the subscription
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }
}
