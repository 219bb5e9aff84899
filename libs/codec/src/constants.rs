//! # Protocol Constants - OpenFlow Core Constants
//!
//! ## Purpose
//!
//! Central registry of the OpenFlow values this controller relies on: the
//! fixed common header, the wire versions the codec implements, and the
//! message type numbers shared by OpenFlow 1.3 and 1.5.
//!
//! ## Integration Points
//!
//! - **Framing**: `OFP_HEADER_SIZE` gates every header read
//! - **Version Negotiation**: `IMPLEMENTED_VERSIONS` bounds what configuration may ask for
//! - **Correlation**: `expected_reply_type` maps a request onto the reply that resolves it
//! - **Event Routing**: `is_asymmetric` decides which messages reach applications

use num_enum::TryFromPrimitive;

/// Size of the common header prefixing every OpenFlow message
pub const OFP_HEADER_SIZE: usize = 8;

/// Wire version byte for OpenFlow 1.3
pub const OFP_VERSION_1_3: u8 = 4;

/// Wire version byte for OpenFlow 1.5
pub const OFP_VERSION_1_5: u8 = 6;

/// Versions this codec can encode and decode
pub const IMPLEMENTED_VERSIONS: [u8; 2] = [OFP_VERSION_1_3, OFP_VERSION_1_5];

/// IANA-assigned OpenFlow TCP port
pub const OFP_TCP_PORT: u16 = 6653;

/// Hello element type carrying the version bitmap
pub const OFPHET_VERSIONBITMAP: u16 = 1;

/// OpenFlow message types (shared numbering for 1.3 and 1.5)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum MsgType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Experimenter = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartRequest = 18,
    MultipartReply = 19,
    BarrierRequest = 20,
    BarrierReply = 21,
    QueueGetConfigRequest = 22,
    QueueGetConfigReply = 23,
    RoleRequest = 24,
    RoleReply = 25,
    GetAsyncRequest = 26,
    GetAsyncReply = 27,
    SetAsync = 28,
    MeterMod = 29,
    RoleStatus = 30,
    TableStatus = 31,
    RequestForward = 32,
    BundleControl = 33,
    BundleAddMessage = 34,
    ControllerStatus = 35,
}

impl MsgType {
    /// Human readable name, falling back to the raw number for unknown types
    pub fn name_of(msg_type: u8) -> String {
        match MsgType::try_from(msg_type) {
            Ok(known) => format!("{:?}", known),
            Err(_) => format!("Unknown({})", msg_type),
        }
    }
}

/// Request types whose reply is `request + 1`
const REQUEST_TYPES: [u8; 8] = [2, 5, 7, 18, 20, 22, 24, 26];

/// Return the reply type the protocol defines for a request type
///
/// Types that are not requests map to themselves.
pub fn expected_reply_type(msg_type: u8) -> u8 {
    if REQUEST_TYPES.contains(&msg_type) {
        msg_type + 1
    } else {
        msg_type
    }
}

/// Check whether a message type is unsolicited (not a direct reply)
///
/// Error, packet-in, flow-removed and port-status are asymmetric on every
/// version. OpenFlow 1.5 adds role-status, table-status, request-forward and
/// controller-status.
pub fn is_asymmetric(version: u8, msg_type: u8) -> bool {
    match msg_type {
        1 | 10 | 11 | 12 => true,
        30 | 31 | 32 | 35 => version >= OFP_VERSION_1_5,
        _ => false,
    }
}

/// Version bitmap advertised in a Hello for a set of versions
pub fn version_bitmap(versions: &[u8]) -> u32 {
    versions
        .iter()
        .filter(|v| **v < 32)
        .fold(0u32, |bitmap, v| bitmap | (1 << v))
}
