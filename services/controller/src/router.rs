//! # Event Router
//!
//! Publishes unsolicited switch messages and controller signals on the bus.
//!
//! - OpenFlow: `CtlOFPEvent.<version>.<type>[.<dpid>]`, payload is the raw frame
//! - Control: `CtlTEvent.<name>`, payload is a small JSON object

use crate::error::ControllerResult;
use bytes::Bytes;
use codec::is_asymmetric;
use event_bus::{ControlPayload, EventBus, RoutingKey};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventRouter {
    bus: Arc<dyn EventBus>,
}

impl EventRouter {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Whether a message of this type is published rather than correlated
    pub fn is_routable(version: u8, msg_type: u8) -> bool {
        is_asymmetric(version, msg_type)
    }

    /// Publish a switch message; returns the routing key used
    pub async fn route(
        &self,
        version: u8,
        msg_type: u8,
        dpid: Option<u64>,
        frame: Bytes,
    ) -> ControllerResult<RoutingKey> {
        let key = RoutingKey::ofp_event(version, msg_type, dpid);
        let delivered = self.bus.publish(key.as_str(), frame).await?;
        debug!(key = %key.as_str(), delivered, "Routed switch message");
        Ok(key)
    }

    /// Publish `CtlTEvent.<name>`; failures are logged, not returned
    pub async fn publish_control(&self, name: &str, payload: &ControlPayload) {
        let key = RoutingKey::control(name);
        let result = match serde_json::to_value(payload) {
            Ok(value) => self.bus.publish_json(key.as_str(), &value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(key = %key.as_str(), error = %e, "Failed to publish control event");
        }
    }
}
