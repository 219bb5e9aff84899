//! # OpenFlow Codec
//!
//! ## Purpose
//!
//! The "Rules" layer of the controller: everything that knows what OpenFlow
//! bytes mean, and nothing that knows where they came from.
//!
//! - Common header parsing and xid stamping
//! - Tagged message variants with a type-tag decoder table
//! - Request/reply and asymmetric type classification
//! - JSON command registry used by the RPC surface
//!
//! ## Architecture Role
//!
//! ```text
//! network/ (frames) → [codec] → controller (correlation, routing)
//!                        ↑
//!                 event-bus RPC (JSON commands)
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling or framing (belongs in network/)
//! - Switch state, correlation or routing (belongs in the controller service)

pub mod constants;
pub mod error;
pub mod message;
pub mod parser;
pub mod registry;

pub use constants::{
    expected_reply_type, is_asymmetric, version_bitmap, MsgType, IMPLEMENTED_VERSIONS,
    OFP_HEADER_SIZE, OFP_TCP_PORT, OFP_VERSION_1_3, OFP_VERSION_1_5,
};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Echo, ErrorMsg, Hello, MessageBody, OfpMessage, SwitchConfig, SwitchFeatures};
pub use parser::{header, stamp_xid, OfpHeader};
pub use registry::{CommandBuilder, CommandRegistry};
