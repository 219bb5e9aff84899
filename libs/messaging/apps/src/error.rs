//! Application error types

use event_bus::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Another live application already uses this name
    #[error("This App's name {0} is not unique")]
    DuplicateName(String),

    #[error("Application {0} is not connected to the bus")]
    NotConnected(String),

    /// RPC call reached the controller but failed there
    #[error("Controller rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] codec::ProtocolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
