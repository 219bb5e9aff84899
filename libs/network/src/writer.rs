//! Outbound frame path
//!
//! Callers hand finished frames to a [`FrameWriter`] without awaiting; a
//! dedicated task per connection drains the queue into the socket, so the
//! transport owns backpressure and a slow switch never stalls the caller.

use crate::{Result, TransportError};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Non-blocking sink for encoded OpenFlow messages
pub trait FrameWriter: Send + Sync {
    /// Queue a frame for transmission
    fn send(&self, frame: Bytes) -> Result<()>;

    /// True once the connection can no longer accept frames
    fn is_closed(&self) -> bool;
}

/// Unbounded channel into a connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    peer: Option<SocketAddr>,
}

impl ChannelWriter {
    /// Writer plus the receiving end, for callers that drain frames themselves
    pub fn channel(peer: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, peer }, rx)
    }
}

impl FrameWriter for ChannelWriter {
    fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::connection("Writer task has stopped", self.peer))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that owns the write half of a connection
///
/// The task ends when every [`ChannelWriter`] clone is dropped or a write
/// fails.
pub fn spawn_writer<W>(mut sink: W, peer: SocketAddr) -> (ChannelWriter, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (writer, mut rx) = ChannelWriter::channel(Some(peer));

    let handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.write_all(&frame).await {
                warn!(peer = %peer, error = %e, "Write to switch failed, stopping writer");
                break;
            }
        }
        let _ = sink.shutdown().await;
        debug!(peer = %peer, "Writer task finished");
    });

    (writer, handle)
}
