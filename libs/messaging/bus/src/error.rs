//! # Event Bus Error Types

use thiserror::Error;

/// Event bus operation errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Subscriber '{0}' already exists")]
    DuplicateSubscriber(String),

    #[error("Unknown subscriber '{0}'")]
    UnknownSubscriber(String),

    /// Pattern has an empty segment or no segments at all
    #[error("Invalid topic pattern '{0}'")]
    InvalidPattern(String),

    #[error("RPC method '{0}' is already registered")]
    DuplicateMethod(String),

    #[error("Unknown RPC method '{0}'")]
    UnknownMethod(String),

    #[error("RPC call '{method}' timed out after {timeout_ms}ms")]
    RpcTimeout { method: String, timeout_ms: u64 },

    #[error("RPC call '{method}' failed: {reason}")]
    RpcFailed { method: String, reason: String },

    /// Event payload does not have the layout its routing key implies
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for bus operations
pub type BusResult<T> = std::result::Result<T, BusError>;
