//! # In-Process Event Bus
//!
//! [`LocalBus`] implements [`EventBus`] inside one process: subscriptions
//! are bounded tokio channels and RPC handlers run on their own task so a
//! caller that gives up does not cancel the handler halfway.
//!
//! Cloning is cheap; every clone shares the same subscriptions and methods.

use crate::bus::{EventBus, Subscription};
use crate::error::{BusError, BusResult};
use crate::event::BusEvent;
use crate::registry::{SubscriptionRegistry, SubscriptionStats};
use crate::rpc::{RpcHandler, RpcRegistry, RpcResponse};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Local bus limits
#[derive(Debug, Clone)]
pub struct LocalBusConfig {
    /// Queue depth per subscriber
    pub subscriber_capacity: usize,
    pub rpc_timeout: Duration,
}

impl Default for LocalBusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 1024,
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

struct LocalBusInner {
    subscriptions: SubscriptionRegistry,
    methods: RpcRegistry,
    config: LocalBusConfig,
}

/// In-process [`EventBus`]
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<LocalBusInner>,
}

impl LocalBus {
    pub fn new(config: LocalBusConfig) -> Self {
        Self {
            inner: Arc::new(LocalBusInner {
                subscriptions: SubscriptionRegistry::new(),
                methods: RpcRegistry::new(),
                config,
            }),
        }
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.inner.subscriptions.stats()
    }

    pub fn methods(&self) -> Vec<String> {
        self.inner.methods.methods()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(LocalBusConfig::default())
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, routing_key: &str, payload: Bytes) -> BusResult<usize> {
        let event = BusEvent::new(routing_key, payload);
        let delivered = self.inner.subscriptions.deliver(&event);
        debug!(routing_key, delivered, "Published event");
        Ok(delivered)
    }

    fn subscribe(&self, name: &str, patterns: &[&str]) -> BusResult<Subscription> {
        let rx = self.inner.subscriptions.subscribe(
            name,
            patterns,
            self.inner.config.subscriber_capacity,
        )?;
        Ok(Subscription::new(name, rx))
    }

    fn unsubscribe(&self, name: &str) -> BusResult<()> {
        self.inner.subscriptions.unsubscribe(name)
    }

    fn register_method(&self, name: &str, handler: Arc<dyn RpcHandler>) -> BusResult<()> {
        self.inner.methods.register(name, handler)
    }

    fn unregister_method(&self, name: &str) -> bool {
        self.inner.methods.unregister(name)
    }

    async fn call(&self, method: &str, params: Value) -> BusResult<RpcResponse> {
        let handler = self.inner.methods.get(method)?;
        let timeout = self.inner.config.rpc_timeout;

        let task = tokio::spawn(async move { handler.handle(params).await });
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(join_err)) => Err(BusError::RpcFailed {
                method: method.to_string(),
                reason: join_err.to_string(),
            }),
            Err(_) => {
                warn!(method, "RPC call timed out");
                Err(BusError::RpcTimeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
