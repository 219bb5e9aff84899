//! # Controller Error Types
//!
//! Failures inside the connection and correlation core are recovered
//! locally (logged, connection-scoped). Only [`ControllerError::Config`]
//! is allowed to abort startup.

use codec::ProtocolError;
use controller_config::ConfigError;
use event_bus::BusError;
use network::TransportError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// Command addressed to a dpid that is not handshake-complete
    #[error("Inexistent dpid: {0}")]
    UnknownDpid(u64),

    #[error("No connection for peer {0}")]
    UnknownPeer(SocketAddr),

    /// An entry for this key is still outstanding
    #[error("Correlation entry for {peer} xid {xid} already exists")]
    DuplicateCorrelation { peer: SocketAddr, xid: u32 },

    #[error("Connection to {0} is closed")]
    ConnectionClosed(SocketAddr),

    /// The ingestion queue has a single consumer
    #[error("Connection manager is already running")]
    AlreadyStarted,
}

impl ControllerError {
    /// True for errors caused by the peer going away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed(_) => true,
            Self::Transport(e) => e.is_disconnect(),
            _ => false,
        }
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
