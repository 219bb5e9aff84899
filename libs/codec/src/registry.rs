//! # Command Registry - JSON to OpenFlow Constructors
//!
//! Maps an OpenFlow class name such as `"OFPEchoRequest"` to a constructor
//! that builds the message from a JSON body. Applications send
//! `{"OFPSetConfig": {"flags": 0, "miss_send_len": 128}}` over the RPC
//! surface; the registry turns the single top-level key into a message for
//! the requested wire version.
//!
//! The registry is built once at startup and read-only afterwards.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Echo, Hello, MessageBody, OfpMessage, SwitchConfig};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Builds a message for `version` from the JSON body under the command key
pub type CommandBuilder = fn(u8, &Value) -> ProtocolResult<OfpMessage>;

/// Name to constructor lookup for JSON commands
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    builders: HashMap<String, CommandBuilder>,
}

impl CommandRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: [(&str, CommandBuilder); 6] = [
            ("OFPHello", build_hello),
            ("OFPEchoRequest", build_echo_request),
            ("OFPFeaturesRequest", |v, _| {
                Ok(OfpMessage::new(v, MessageBody::FeaturesRequest))
            }),
            ("OFPGetConfigRequest", |v, _| {
                Ok(OfpMessage::new(v, MessageBody::GetConfigRequest))
            }),
            ("OFPSetConfig", build_set_config),
            ("OFPBarrierRequest", |v, _| {
                Ok(OfpMessage::new(v, MessageBody::BarrierRequest))
            }),
        ];
        for (name, builder) in defaults {
            // Names in the table above are distinct
            let _ = registry.register(name, builder);
        }
        registry
    }

    /// Register a constructor; names must be unique
    pub fn register(&mut self, name: &str, builder: CommandBuilder) -> ProtocolResult<()> {
        if self.builders.contains_key(name) {
            return Err(ProtocolError::DuplicateCommand(name.to_string()));
        }
        debug!("Registered OpenFlow command {}", name);
        self.builders.insert(name.to_string(), builder);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a message from a `{"<Name>": {...}}` payload
    ///
    /// Only the first top-level key is considered. A payload that is not an
    /// object or has no keys yields [`ProtocolError::EmptyCommand`].
    pub fn build(&self, version: u8, payload: &Value) -> ProtocolResult<OfpMessage> {
        let (name, body) = payload
            .as_object()
            .and_then(|obj| obj.iter().next())
            .ok_or(ProtocolError::EmptyCommand)?;

        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownCommand(name.clone()))?;
        builder(version, body)
    }
}

fn build_hello(version: u8, body: &Value) -> ProtocolResult<OfpMessage> {
    let hello: Hello = if body.is_null() {
        Hello::default()
    } else {
        serde_json::from_value(body.clone())
            .map_err(|e| ProtocolError::invalid_command("OFPHello", e))?
    };
    Ok(OfpMessage::new(version, MessageBody::Hello(hello)))
}

/// `{"data": "<hex>"}` with `data` optional
fn build_echo_request(version: u8, body: &Value) -> ProtocolResult<OfpMessage> {
    let data = match body.get("data") {
        None | Some(Value::Null) => Bytes::new(),
        Some(Value::String(s)) => hex::decode(s)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::invalid_command("OFPEchoRequest", e))?,
        Some(other) => {
            return Err(ProtocolError::invalid_command(
                "OFPEchoRequest",
                format!("data must be a hex string, got {}", other),
            ))
        }
    };
    Ok(OfpMessage::new(version, MessageBody::EchoRequest(Echo { data })))
}

fn build_set_config(version: u8, body: &Value) -> ProtocolResult<OfpMessage> {
    let config: SwitchConfig = serde_json::from_value(body.clone())
        .map_err(|e| ProtocolError::invalid_command("OFPSetConfig", e))?;
    Ok(OfpMessage::new(version, MessageBody::SetConfig(config)))
}
