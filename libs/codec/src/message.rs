//! # OpenFlow Messages - Tagged Variant Model
//!
//! ## Purpose
//!
//! One `MessageBody` variant per concrete message the controller needs to
//! understand, plus `Raw` for everything it only forwards (packet-in,
//! flow-mod, multipart, ...). Decoding dispatches on the header type tag
//! through [`decoder_for`]; types without a decoder stay `Raw` so they
//! round-trip byte-for-byte.
//!
//! ## Body Layouts (identical for 1.3 and 1.5)
//!
//! ```text
//! Hello           [elements: type u16 | len u16 | bitmap u32 ...] (padded to 8)
//! Error           type u16 | code u16 | data ...
//! Echo*           data ...
//! FeaturesReply   datapath_id u64 | n_buffers u32 | n_tables u8 | aux_id u8
//!                 | pad 2 | capabilities u32 | reserved u32
//! *Config         flags u16 | miss_send_len u16
//! ```

use crate::constants::{
    MsgType, IMPLEMENTED_VERSIONS, OFPHET_VERSIONBITMAP, OFP_HEADER_SIZE,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::parser::OfpHeader;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Hello body: optional version bitmap element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    #[serde(default)]
    pub version_bitmap: Option<u32>,
}

/// Error message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Bytes,
}

/// Echo request/reply body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Echo {
    pub data: Bytes,
}

/// Features reply body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: u32,
}

/// Get-config reply / set-config body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default)]
    pub flags: u16,
    #[serde(default = "default_miss_send_len")]
    pub miss_send_len: u16,
}

fn default_miss_send_len() -> u16 {
    128
}

const FEATURES_BODY_LEN: usize = 24;
const CONFIG_BODY_LEN: usize = 4;
const ERROR_MIN_BODY_LEN: usize = 4;

/// Concrete message bodies, one variant per modelled type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Echo),
    EchoReply(Echo),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    BarrierRequest,
    BarrierReply,
    /// Any type without a dedicated variant, carried as the raw body
    Raw { msg_type: u8, payload: Bytes },
}

impl MessageBody {
    /// Wire type tag of this body
    pub fn msg_type(&self) -> u8 {
        let t = match self {
            MessageBody::Hello(_) => MsgType::Hello,
            MessageBody::Error(_) => MsgType::Error,
            MessageBody::EchoRequest(_) => MsgType::EchoRequest,
            MessageBody::EchoReply(_) => MsgType::EchoReply,
            MessageBody::FeaturesRequest => MsgType::FeaturesRequest,
            MessageBody::FeaturesReply(_) => MsgType::FeaturesReply,
            MessageBody::GetConfigRequest => MsgType::GetConfigRequest,
            MessageBody::GetConfigReply(_) => MsgType::GetConfigReply,
            MessageBody::SetConfig(_) => MsgType::SetConfig,
            MessageBody::BarrierRequest => MsgType::BarrierRequest,
            MessageBody::BarrierReply => MsgType::BarrierReply,
            MessageBody::Raw { msg_type, .. } => return *msg_type,
        };
        t as u8
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            MessageBody::Hello(hello) => {
                if let Some(bitmap) = hello.version_bitmap {
                    buf.put_u16(OFPHET_VERSIONBITMAP);
                    buf.put_u16(8);
                    buf.put_u32(bitmap);
                }
            }
            MessageBody::Error(err) => {
                buf.put_u16(err.err_type);
                buf.put_u16(err.code);
                buf.put_slice(&err.data);
            }
            MessageBody::EchoRequest(echo) | MessageBody::EchoReply(echo) => {
                buf.put_slice(&echo.data);
            }
            MessageBody::FeaturesReply(f) => {
                buf.put_u64(f.datapath_id);
                buf.put_u32(f.n_buffers);
                buf.put_u8(f.n_tables);
                buf.put_u8(f.auxiliary_id);
                buf.put_u16(0);
                buf.put_u32(f.capabilities);
                buf.put_u32(0);
            }
            MessageBody::GetConfigReply(c) | MessageBody::SetConfig(c) => {
                buf.put_u16(c.flags);
                buf.put_u16(c.miss_send_len);
            }
            MessageBody::Raw { payload, .. } => buf.put_slice(payload),
            MessageBody::FeaturesRequest
            | MessageBody::GetConfigRequest
            | MessageBody::BarrierRequest
            | MessageBody::BarrierReply => {}
        }
    }
}

/// Body decoder signature used by the type-tag lookup table
pub type BodyDecoder = fn(&[u8]) -> Result<MessageBody, String>;

/// Look up the body decoder for a type tag
///
/// Returns `None` for types that are carried as [`MessageBody::Raw`].
pub fn decoder_for(msg_type: u8) -> Option<BodyDecoder> {
    let t = MsgType::try_from(msg_type).ok()?;
    let decoder: BodyDecoder = match t {
        MsgType::Hello => decode_hello,
        MsgType::Error => decode_error,
        MsgType::EchoRequest => |b| Ok(MessageBody::EchoRequest(Echo {
            data: Bytes::copy_from_slice(b),
        })),
        MsgType::EchoReply => |b| Ok(MessageBody::EchoReply(Echo {
            data: Bytes::copy_from_slice(b),
        })),
        MsgType::FeaturesRequest => |_| Ok(MessageBody::FeaturesRequest),
        MsgType::FeaturesReply => decode_features_reply,
        MsgType::GetConfigRequest => |_| Ok(MessageBody::GetConfigRequest),
        MsgType::GetConfigReply => |b| decode_config(b).map(MessageBody::GetConfigReply),
        MsgType::SetConfig => |b| decode_config(b).map(MessageBody::SetConfig),
        MsgType::BarrierRequest => |_| Ok(MessageBody::BarrierRequest),
        MsgType::BarrierReply => |_| Ok(MessageBody::BarrierReply),
        _ => return None,
    };
    Some(decoder)
}

fn decode_hello(mut body: &[u8]) -> Result<MessageBody, String> {
    let mut hello = Hello::default();
    while body.len() >= 4 {
        let elem_type = body.get_u16();
        let elem_len = body.get_u16() as usize;
        if elem_len < 4 {
            return Err(format!("hello element length {} below 4", elem_len));
        }
        let content_len = elem_len - 4;
        if body.len() < content_len {
            return Err(format!(
                "hello element needs {} bytes, {} left",
                content_len,
                body.len()
            ));
        }
        let mut content = &body[..content_len];
        if elem_type == OFPHET_VERSIONBITMAP && content.len() >= 4 && hello.version_bitmap.is_none()
        {
            hello.version_bitmap = Some(content.get_u32());
        }
        // Elements are padded to a multiple of 8 bytes
        let padded = ((elem_len + 7) / 8) * 8 - 4;
        body.advance(padded.min(body.len()));
    }
    Ok(MessageBody::Hello(hello))
}

fn decode_error(mut body: &[u8]) -> Result<MessageBody, String> {
    if body.len() < ERROR_MIN_BODY_LEN {
        return Err(format!("error body is {} bytes", body.len()));
    }
    let err_type = body.get_u16();
    let code = body.get_u16();
    Ok(MessageBody::Error(ErrorMsg {
        err_type,
        code,
        data: Bytes::copy_from_slice(body),
    }))
}

fn decode_features_reply(mut body: &[u8]) -> Result<MessageBody, String> {
    if body.len() < FEATURES_BODY_LEN {
        return Err(format!(
            "features reply body is {} bytes, need {}",
            body.len(),
            FEATURES_BODY_LEN
        ));
    }
    let datapath_id = body.get_u64();
    let n_buffers = body.get_u32();
    let n_tables = body.get_u8();
    let auxiliary_id = body.get_u8();
    body.advance(2);
    let capabilities = body.get_u32();
    Ok(MessageBody::FeaturesReply(SwitchFeatures {
        datapath_id,
        n_buffers,
        n_tables,
        auxiliary_id,
        capabilities,
    }))
}

fn decode_config(mut body: &[u8]) -> Result<SwitchConfig, String> {
    if body.len() < CONFIG_BODY_LEN {
        return Err(format!("config body is {} bytes", body.len()));
    }
    Ok(SwitchConfig {
        flags: body.get_u16(),
        miss_send_len: body.get_u16(),
    })
}

/// A complete OpenFlow message: version, transaction id and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfpMessage {
    pub version: u8,
    pub xid: u32,
    pub body: MessageBody,
}

impl OfpMessage {
    pub fn new(version: u8, body: MessageBody) -> Self {
        Self {
            version,
            xid: 0,
            body,
        }
    }

    pub fn hello(version: u8, supported: &[u8]) -> Self {
        Self::new(
            version,
            MessageBody::Hello(Hello {
                version_bitmap: Some(crate::constants::version_bitmap(supported)),
            }),
        )
    }

    pub fn echo_request(version: u8) -> Self {
        Self::new(version, MessageBody::EchoRequest(Echo::default()))
    }

    pub fn echo_reply(version: u8, data: Bytes) -> Self {
        Self::new(version, MessageBody::EchoReply(Echo { data }))
    }

    pub fn features_request(version: u8) -> Self {
        Self::new(version, MessageBody::FeaturesRequest)
    }

    pub fn msg_type(&self) -> u8 {
        self.body.msg_type()
    }

    /// Serialize header and body; the header length is computed here
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_bytes(0, OFP_HEADER_SIZE);
        self.body.encode_into(&mut buf);

        let length = u16::try_from(buf.len()).map_err(|_| ProtocolError::MessageTooLarge {
            size: buf.len(),
            max: u16::MAX as usize,
        })?;
        let header = OfpHeader::new(self.version, self.msg_type(), length, self.xid);
        buf[..OFP_HEADER_SIZE].copy_from_slice(&header.encode());
        Ok(buf.freeze())
    }

    /// Decode one complete message from the start of `data`
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let header = OfpHeader::parse(data)?;
        Self::decode_with_header(&header, data)
    }

    /// Decode using an already-parsed header
    pub fn decode_with_header(header: &OfpHeader, data: &[u8]) -> ProtocolResult<Self> {
        let length = header.length as usize;
        if data.len() < length {
            return Err(ProtocolError::message_too_small(
                length,
                data.len(),
                format!("{} body", MsgType::name_of(header.msg_type)),
            ));
        }
        if !IMPLEMENTED_VERSIONS.contains(&header.version) {
            return Err(ProtocolError::UnsupportedVersion {
                version: header.version,
                supported_versions: format!("{:?}", IMPLEMENTED_VERSIONS),
            });
        }

        let body_bytes = &data[OFP_HEADER_SIZE..length];
        let body = match decoder_for(header.msg_type) {
            Some(decode) => decode(body_bytes).map_err(|reason| {
                ProtocolError::malformed(
                    header.version,
                    header.msg_type,
                    header.length,
                    header.xid,
                    reason,
                    &data[..length],
                )
            })?,
            None => MessageBody::Raw {
                msg_type: header.msg_type,
                payload: Bytes::copy_from_slice(body_bytes),
            },
        };

        Ok(Self {
            version: header.version,
            xid: header.xid,
            body,
        })
    }
}
