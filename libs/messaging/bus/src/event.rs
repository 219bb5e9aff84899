//! Bus events and payload layouts
//!
//! - `CtlOFPEvent` payload: the raw encoded OpenFlow message
//! - `AppOFPEvent` payload: 8-byte big-endian dpid followed by the message
//! - `CtlTEvent` payload: JSON object, `{"dpid": n}` for connect/disconnect

use crate::error::{BusError, BusResult};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// One delivered event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub routing_key: String,
    pub payload: Bytes,
}

impl BusEvent {
    pub fn new(routing_key: impl Into<String>, payload: Bytes) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
        }
    }

    /// Deserialize a JSON payload
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> BusResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Control-plane signal body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpid: Option<u64>,
    /// Peer address for signals about connections without a dpid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl ControlPayload {
    pub fn dpid(dpid: u64) -> Self {
        Self {
            dpid: Some(dpid),
            peer: None,
        }
    }

    pub fn peer(peer: impl ToString) -> Self {
        Self {
            dpid: None,
            peer: Some(peer.to_string()),
        }
    }
}

const DPID_PREFIX_LEN: usize = 8;

/// Prefix an encoded message with its target dpid
pub fn encode_app_ofp_payload(dpid: u64, message: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(DPID_PREFIX_LEN + message.len());
    buf.put_u64(dpid);
    buf.put_slice(message);
    buf.freeze()
}

/// Split an `AppOFPEvent` payload into dpid and message bytes
pub fn decode_app_ofp_payload(payload: &Bytes) -> BusResult<(u64, Bytes)> {
    if payload.len() < DPID_PREFIX_LEN {
        return Err(BusError::InvalidPayload(format!(
            "AppOFPEvent payload is {} bytes, need at least {}",
            payload.len(),
            DPID_PREFIX_LEN
        )));
    }
    let mut prefix = [0u8; DPID_PREFIX_LEN];
    prefix.copy_from_slice(&payload[..DPID_PREFIX_LEN]);
    Ok((u64::from_be_bytes(prefix), payload.slice(DPID_PREFIX_LEN..)))
}
