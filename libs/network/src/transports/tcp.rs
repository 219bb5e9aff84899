//! TCP Network Transport Implementation
//!
//! Listener for switch connections. Every accepted stream gets `TCP_NODELAY`
//! (OpenFlow messages are small and latency-sensitive) and is split into a
//! framed reader plus a writer task.

use crate::framing::OfpFrameReader;
use crate::writer::{spawn_writer, ChannelWriter};
use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// TCP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpServerConfig {
    /// `host:port` to bind, resolved at bind time
    pub bind_address: String,
    /// Maximum message size accepted from a switch
    pub max_message_size: usize,
    pub nodelay: bool,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("127.0.0.1:{}", codec::OFP_TCP_PORT),
            max_message_size: u16::MAX as usize,
            nodelay: true,
        }
    }
}

/// Accepted switch connection, split for independent read and write
pub struct SwitchStream {
    pub peer: SocketAddr,
    pub reader: OfpFrameReader<OwnedReadHalf>,
    pub writer: ChannelWriter,
    pub writer_task: JoinHandle<()>,
}

/// TCP listener for switch connections
pub struct TcpServer {
    listener: TcpListener,
    config: TcpServerConfig,
}

impl TcpServer {
    /// Bind the listener
    pub async fn bind(config: TcpServerConfig) -> Result<Self> {
        if config.bind_address.is_empty() {
            return Err(TransportError::configuration(
                "bind address is empty",
                Some("bind_address"),
            ));
        }

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to bind TCP listener", e))?;

        info!("📡 OpenFlow listener bound on {}", config.bind_address);
        Ok(Self { listener, config })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next switch connection
    pub async fn accept(&self) -> Result<SwitchStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to accept TCP connection", e))?;
        Ok(self.split(stream, peer))
    }

    fn split(&self, stream: TcpStream, peer: SocketAddr) -> SwitchStream {
        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %peer, "Failed to set TCP_NODELAY: {}", e);
            }
        }

        let (read_half, write_half) = stream.into_split();
        let reader =
            OfpFrameReader::new(read_half, self.config.max_message_size).with_peer(peer);
        let (writer, writer_task) = spawn_writer(write_half, peer);

        SwitchStream {
            peer,
            reader,
            writer,
            writer_task,
        }
    }
}
