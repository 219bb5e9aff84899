//! # Header Parser - OpenFlow Common Header
//!
//! ## Purpose
//!
//! Every OpenFlow message starts with the same 8-byte header:
//!
//! ```text
//! 0        1        2                 4                                 8
//! +--------+--------+-----------------+---------------------------------+
//! | version|  type  |   length (BE)   |            xid (BE)             |
//! +--------+--------+-----------------+---------------------------------+
//! ```
//!
//! `length` covers the whole message including the header. The parser is the
//! only code in the controller that looks at raw bytes before a message has
//! been attributed to a connection, so it never panics and never allocates.

use crate::constants::OFP_HEADER_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use zerocopy::byteorder::network_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Byte-exact view of the common header
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct WireHeader {
    version: u8,
    msg_type: u8,
    length: U16,
    xid: U32,
}

/// Decoded OpenFlow common header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfpHeader {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl OfpHeader {
    pub fn new(version: u8, msg_type: u8, length: u16, xid: u32) -> Self {
        Self {
            version,
            msg_type,
            length,
            xid,
        }
    }

    /// Parse the header from the start of `data`
    ///
    /// Requires at least [`OFP_HEADER_SIZE`] bytes and rejects a length field
    /// shorter than the header itself. Trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        let wire = WireHeader::read_from_prefix(data).ok_or_else(|| {
            ProtocolError::message_too_small(OFP_HEADER_SIZE, data.len(), "OpenFlow header")
        })?;

        let length = wire.length.get();
        if (length as usize) < OFP_HEADER_SIZE {
            return Err(ProtocolError::InvalidLength {
                length,
                min: OFP_HEADER_SIZE,
            });
        }

        Ok(Self {
            version: wire.version,
            msg_type: wire.msg_type,
            length,
            xid: wire.xid.get(),
        })
    }

    /// Serialize to the 8-byte wire form
    pub fn encode(&self) -> [u8; OFP_HEADER_SIZE] {
        let wire = WireHeader {
            version: self.version,
            msg_type: self.msg_type,
            length: U16::new(self.length),
            xid: U32::new(self.xid),
        };
        let mut out = [0u8; OFP_HEADER_SIZE];
        out.copy_from_slice(wire.as_bytes());
        out
    }
}

/// Extract `(version, type, length, xid)` from a raw message
pub fn header(data: &[u8]) -> ProtocolResult<(u8, u8, u16, u32)> {
    let h = OfpHeader::parse(data)?;
    Ok((h.version, h.msg_type, h.length, h.xid))
}

/// Overwrite the xid of an already-encoded message in place
pub fn stamp_xid(data: &mut [u8], xid: u32) -> ProtocolResult<()> {
    if data.len() < OFP_HEADER_SIZE {
        return Err(ProtocolError::message_too_small(
            OFP_HEADER_SIZE,
            data.len(),
            "xid stamping",
        ));
    }
    data[4..8].copy_from_slice(&xid.to_be_bytes());
    Ok(())
}
