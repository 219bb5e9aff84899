//! # Event Bus
//!
//! ## Purpose
//!
//! Fan-out of switch events from the controller to independent
//! applications, and a request/reply RPC surface for applications to send
//! commands back to switches.
//!
//! ## Architecture Role
//!
//! ```text
//!                      ┌──────────── CtlOFPEvent.<v>.<t>.<dpid> ───────────► apps
//! controller ──publish─┤
//!                      └──────────── CtlTEvent.switch.{connected,...} ─────► apps
//!
//! apps ──call("write_json", ...)──► RPC registry ──► controller handler ──► {result, error}
//! ```
//!
//! ## Components
//!
//! - [`topics`]: event classes, routing keys and topic-exchange matching
//! - [`registry`]: named subscribers with bounded queues
//! - [`rpc`]: method registry and the `{result, error}` response shape
//! - [`LocalBus`]: in-process [`EventBus`]

pub mod bus;
pub mod error;
pub mod event;
pub mod local;
pub mod registry;
pub mod rpc;
pub mod topics;

pub use bus::{EventBus, Subscription};
pub use error::{BusError, BusResult};
pub use event::{decode_app_ofp_payload, encode_app_ofp_payload, BusEvent, ControlPayload};
pub use local::{LocalBus, LocalBusConfig};
pub use registry::{SubscriptionRegistry, SubscriptionStats};
pub use rpc::{
    handler_fn, methods, RpcHandler, RpcRegistry, RpcResponse, SwitchList, WriteDpidParams,
    WriteJsonParams,
};
pub use topics::{control, topic_matches, EventClass, OfpKey, RoutingKey};
