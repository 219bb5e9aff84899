//! Protocol-level errors for OpenFlow message processing
//!
//! Provides error handling for the OpenFlow wire codec, including enough
//! context (version, type, length, xid and the raw bytes) to diagnose a
//! misbehaving switch from the log line alone.

use thiserror::Error;

/// Codec errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Header length field is impossible (shorter than the header itself)
    #[error("Invalid header length {length}: must be at least {min} bytes")]
    InvalidLength { length: u16, min: usize },

    /// Encoded message would not fit the 16-bit length field
    #[error("Message too large: {size} bytes exceeds {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Protocol version is not implemented by this codec
    #[error("Unsupported OpenFlow version {version}: supported versions are {supported_versions}")]
    UnsupportedVersion {
        version: u8,
        supported_versions: String,
    },

    /// Body did not decode for the declared type
    #[error("Malformed message: version {version} msg_type {msg_type} msg_len {length} xid {xid}: {reason} (buf: {raw})")]
    Malformed {
        version: u8,
        msg_type: u8,
        length: u16,
        xid: u32,
        reason: String,
        raw: String,
    },

    /// JSON command payload had no top-level key
    #[error("JSON message payload doesn't have any keys")]
    EmptyCommand,

    /// JSON command name has no registered constructor
    #[error("This '{0}' doesn't map to an OpenFlow abstraction")]
    UnknownCommand(String),

    /// Constructor rejected the JSON body
    #[error("Invalid '{name}' command body: {reason}")]
    InvalidCommand { name: String, reason: String },

    /// A constructor is already registered under this name
    #[error("Command '{0}' is already registered")]
    DuplicateCommand(String),
}

impl ProtocolError {
    /// Create MessageTooSmall error with diagnostic context
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create Malformed error, hex-encoding the offending bytes
    pub fn malformed(
        version: u8,
        msg_type: u8,
        length: u16,
        xid: u32,
        reason: impl Into<String>,
        raw: &[u8],
    ) -> Self {
        Self::Malformed {
            version,
            msg_type,
            length,
            xid,
            reason: reason.into(),
            raw: hex::encode(raw),
        }
    }

    /// Create InvalidCommand error
    pub fn invalid_command(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidCommand {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_carries_hex_dump() {
        let err = ProtocolError::malformed(4, 6, 32, 7, "truncated body", &[0x04, 0x06, 0x00]);
        let text = err.to_string();
        assert!(text.contains("version 4"));
        assert!(text.contains("xid 7"));
        assert!(text.contains("040600"));
    }

    #[test]
    fn test_unknown_command_message() {
        let err = ProtocolError::UnknownCommand("OFPNope".to_string());
        assert_eq!(
            err.to_string(),
            "This 'OFPNope' doesn't map to an OpenFlow abstraction"
        );
    }
}
