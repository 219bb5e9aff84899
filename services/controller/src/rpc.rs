//! # RPC Surface
//!
//! Methods the controller serves on the bus:
//!
//! | method | params | result |
//! |---|---|---|
//! | `list_switches` | none | `{"dpids": [...]}` |
//! | `write_dpid` | `{dpid, payload}` | `true` or an error string |
//! | `write_json` | `{dpid, msg: {"OFPName": {...}}}` | `true` or an error string |
//!
//! Every failure is reported in the response's `error` field.

use crate::error::{ControllerError, ControllerResult};
use crate::manager::ConnectionManager;
use async_trait::async_trait;
use codec::CommandRegistry;
use event_bus::{
    methods, EventBus, RpcHandler, RpcResponse, SwitchList, WriteDpidParams, WriteJsonParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const WRONG_REPLY: &str = "Wrong OpenFlow message reply received";

pub struct ListSwitches {
    manager: ConnectionManager,
}

#[async_trait]
impl RpcHandler for ListSwitches {
    async fn handle(&self, _params: Value) -> RpcResponse {
        let list = SwitchList {
            dpids: self.manager.list_switches(),
        };
        match serde_json::to_value(list) {
            Ok(result) => RpcResponse::ok(result),
            Err(e) => RpcResponse::error(e.to_string()),
        }
    }
}

/// Send an already-encoded message
pub struct WriteDpid {
    manager: ConnectionManager,
}

#[async_trait]
impl RpcHandler for WriteDpid {
    async fn handle(&self, params: Value) -> RpcResponse {
        let params: WriteDpidParams = match parse_params(methods::WRITE_DPID, params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let Some(switch) = self.manager.switch_by_dpid(params.dpid) else {
            return unknown_dpid(params.dpid);
        };

        let fail_open = self.manager.config().correlation.fail_open;
        let sent = self
            .manager
            .write_frame_wait(&switch, &params.payload, fail_open)
            .await;
        respond(methods::WRITE_DPID, params.dpid, sent)
    }
}

/// Build a message from a named JSON command and send it
pub struct WriteJson {
    manager: ConnectionManager,
    commands: Arc<CommandRegistry>,
}

#[async_trait]
impl RpcHandler for WriteJson {
    async fn handle(&self, params: Value) -> RpcResponse {
        let params: WriteJsonParams = match parse_params(methods::WRITE_JSON, params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let Some(switch) = self.manager.switch_by_dpid(params.dpid) else {
            return unknown_dpid(params.dpid);
        };

        let version = switch
            .version()
            .unwrap_or_else(|| self.manager.fallback_version());
        let message = match self.commands.build(version, &params.msg) {
            Ok(message) => message,
            Err(e) => return RpcResponse::error(e.to_string()),
        };

        let fail_open = self.manager.config().correlation.fail_open;
        let sent = self.manager.write_switch_wait(&switch, message, fail_open).await;
        respond(methods::WRITE_JSON, params.dpid, sent)
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, RpcResponse> {
    serde_json::from_value(params)
        .map_err(|e| RpcResponse::error(format!("Invalid '{}' params: {}", method, e)))
}

fn unknown_dpid(dpid: u64) -> RpcResponse {
    RpcResponse::error(ControllerError::UnknownDpid(dpid).to_string())
}

fn respond(method: &str, dpid: u64, sent: ControllerResult<bool>) -> RpcResponse {
    match sent {
        Ok(true) => RpcResponse::ok(true),
        Ok(false) => RpcResponse::error(WRONG_REPLY),
        Err(e) => {
            debug!(method, dpid, error = %e, "Write failed");
            RpcResponse::error(e.to_string())
        }
    }
}

/// Serve all controller methods on `bus`
pub fn register_methods(
    bus: &dyn EventBus,
    manager: &ConnectionManager,
    commands: Arc<CommandRegistry>,
) -> ControllerResult<()> {
    bus.register_method(
        methods::LIST_SWITCHES,
        Arc::new(ListSwitches {
            manager: manager.clone(),
        }),
    )?;
    bus.register_method(
        methods::WRITE_DPID,
        Arc::new(WriteDpid {
            manager: manager.clone(),
        }),
    )?;
    bus.register_method(
        methods::WRITE_JSON,
        Arc::new(WriteJson {
            manager: manager.clone(),
            commands,
        }),
    )?;
    info!("RPC methods registered");
    Ok(())
}

pub fn unregister_methods(bus: &dyn EventBus) {
    for method in [methods::LIST_SWITCHES, methods::WRITE_DPID, methods::WRITE_JSON] {
        bus.unregister_method(method);
    }
}
