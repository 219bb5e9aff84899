//! # Application Client
//!
//! ## Purpose
//!
//! The application's view of the controller. An [`AppClient`] owns a unique
//! name, a subscription to controller events and an [`AppCommands`] handle
//! for the RPC surface.
//!
//! ## Event Flow
//!
//! ```text
//! CtlOFPEvent.<v>.<t>.<dpid>  ─┐
//!                              ├─► subscription ─► next_event() ─► AppEvent
//! CtlTEvent.<name>            ─┘
//!
//! AppCommands::write_json ──► call("write_json") ──► controller
//! ```

use crate::error::{AppError, AppResult};
use crate::registry::AppRegistry;
use bytes::Bytes;
use codec::OfpMessage;
use event_bus::{
    encode_app_ofp_payload, methods, EventBus, EventClass, RoutingKey, RpcResponse,
    Subscription, SwitchList, WriteDpidParams, WriteJsonParams,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decoded event delivered to an application
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Unsolicited OpenFlow message from a switch
    OpenFlow {
        version: u8,
        msg_type: u8,
        dpid: Option<u64>,
        message: OfpMessage,
    },
    /// Controller signal such as `switch.connected`
    Control { name: String, payload: Value },
}

/// Cloneable handle for issuing commands through the bus
#[derive(Clone)]
pub struct AppCommands {
    name: Arc<str>,
    bus: Arc<dyn EventBus>,
}

impl AppCommands {
    pub fn app_name(&self) -> &str {
        &self.name
    }

    /// Identifiers of every handshake-complete switch
    pub async fn list_switches(&self) -> AppResult<Vec<u64>> {
        let response = self.call(methods::LIST_SWITCHES, Value::Null).await?;
        let list: SwitchList = serde_json::from_value(response.result)
            .map_err(|e| AppError::InvalidResponse(e.to_string()))?;
        Ok(list.dpids)
    }

    /// Send an encoded message to `dpid` and wait for the controller's verdict
    pub async fn write_dpid(&self, dpid: u64, message: &OfpMessage) -> AppResult<()> {
        let payload = message.encode()?.to_vec();
        let params = serde_json::to_value(WriteDpidParams { dpid, payload })?;
        self.call(methods::WRITE_DPID, params).await?;
        Ok(())
    }

    /// Send a `{"OFPName": {...}}` command to `dpid`
    pub async fn write_json(&self, dpid: u64, msg: Value) -> AppResult<()> {
        let params = serde_json::to_value(WriteJsonParams { dpid, msg })?;
        self.call(methods::WRITE_JSON, params).await?;
        Ok(())
    }

    /// Fire-and-forget: publish `message` for `dpid` as an `AppOFPEvent`
    ///
    /// The controller forwards it under a fresh xid; no reply is awaited.
    pub async fn send(&self, dpid: u64, message: &OfpMessage) -> AppResult<usize> {
        let frame = message.encode()?;
        let key = RoutingKey::app_ofp_event(message.version, message.msg_type());
        let payload = encode_app_ofp_payload(dpid, &frame);
        Ok(self.bus.publish(key.as_str(), payload).await?)
    }

    /// Publish an application signal as `AppTEvent.<name>`
    pub async fn publish(&self, name: &str, payload: &Value) -> AppResult<usize> {
        let key = RoutingKey::app_event(name);
        Ok(self.bus.publish_json(key.as_str(), payload).await?)
    }

    async fn call(&self, method: &str, params: Value) -> AppResult<RpcResponse> {
        let response = self.bus.call(method, params).await?;
        if !response.is_ok() {
            debug!(app = %self.name, method, error = %response.error, "RPC rejected");
            return Err(AppError::Rejected(response.error));
        }
        Ok(response)
    }
}

/// Named application connected to the bus
pub struct AppClient {
    commands: AppCommands,
    registry: AppRegistry,
    subscription: Option<Subscription>,
}

impl AppClient {
    /// Claim `name` in `registry`; fails if another client holds it
    pub fn new(name: &str, bus: Arc<dyn EventBus>, registry: &AppRegistry) -> AppResult<Self> {
        registry.register(name)?;
        info!("{} just started", name);
        Ok(Self {
            commands: AppCommands {
                name: Arc::from(name),
                bus,
            },
            registry: registry.clone(),
            subscription: None,
        })
    }

    pub fn name(&self) -> &str {
        self.commands.app_name()
    }

    pub fn commands(&self) -> AppCommands {
        self.commands.clone()
    }

    /// Subscribe to every controller OpenFlow event and control signal
    pub fn connect(&mut self) -> AppResult<()> {
        let ofp = EventClass::CtlOFPEvent.wildcard();
        let ctl = EventClass::CtlTEvent.wildcard();
        info!("{} subscribing to {} and {}", self.name(), ofp, ctl);
        let subscription = self
            .commands
            .bus
            .subscribe(self.name(), &[ofp.as_str(), ctl.as_str()])?;
        self.subscription = Some(subscription);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Next decodable event; `None` once the bus closed the subscription
    ///
    /// Events that cannot be decoded are logged and skipped.
    pub async fn next_event(&mut self) -> AppResult<Option<AppEvent>> {
        let name = self.commands.name.clone();
        let subscription = self
            .subscription
            .as_mut()
            .ok_or_else(|| AppError::NotConnected(name.to_string()))?;

        while let Some(event) = subscription.recv().await {
            match decode_event(&event.routing_key, &event.payload) {
                Ok(Some(app_event)) => return Ok(Some(app_event)),
                Ok(None) => debug!(app = %name, key = %event.routing_key, "Ignoring event"),
                Err(e) => warn!(app = %name, key = %event.routing_key, "Undecodable event: {}", e),
            }
        }
        Ok(None)
    }

    pub async fn list_switches(&self) -> AppResult<Vec<u64>> {
        self.commands.list_switches().await
    }

    pub async fn write_dpid(&self, dpid: u64, message: &OfpMessage) -> AppResult<()> {
        self.commands.write_dpid(dpid, message).await
    }

    pub async fn write_json(&self, dpid: u64, msg: Value) -> AppResult<()> {
        self.commands.write_json(dpid, msg).await
    }

    pub async fn send(&self, dpid: u64, message: &OfpMessage) -> AppResult<usize> {
        self.commands.send(dpid, message).await
    }

    pub async fn publish(&self, name: &str, payload: &Value) -> AppResult<usize> {
        self.commands.publish(name, payload).await
    }
}

impl Drop for AppClient {
    fn drop(&mut self) {
        if self.subscription.take().is_some() {
            let _ = self.commands.bus.unsubscribe(self.name());
        }
        self.registry.unregister(self.name());
    }
}

fn decode_event(routing_key: &str, payload: &Bytes) -> AppResult<Option<AppEvent>> {
    match RoutingKey::class_of(routing_key) {
        Some(EventClass::CtlOFPEvent) => {
            let Some(key) = RoutingKey::parse_ofp(routing_key) else {
                return Ok(None);
            };
            let message = OfpMessage::decode(payload)?;
            Ok(Some(AppEvent::OpenFlow {
                version: key.version,
                msg_type: key.msg_type,
                dpid: key.dpid,
                message,
            }))
        }
        Some(EventClass::CtlTEvent) => {
            let Some(name) = RoutingKey::event_name(routing_key) else {
                return Ok(None);
            };
            let payload = if payload.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(payload)?
            };
            Ok(Some(AppEvent::Control {
                name: name.to_string(),
                payload,
            }))
        }
        _ => Ok(None),
    }
}
