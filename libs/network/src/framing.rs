//! # OpenFlow Framing
//!
//! OpenFlow has no framing beyond the common header: the `length` field
//! covers the whole message, header included. A single TCP read may carry
//! several messages or a fragment of one, so the reader buffers until the
//! declared length is available and then splits off exactly one frame.
//!
//! A length below the header size or above the configured maximum cannot be
//! resynchronised and ends the connection.

use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use codec::{OfpHeader, OFP_HEADER_SIZE};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

const READ_CHUNK: usize = 8 * 1024;

/// Reads whole OpenFlow messages from a byte stream
pub struct OfpFrameReader<R> {
    reader: R,
    buffer: BytesMut,
    max_message_size: usize,
    peer: Option<SocketAddr>,
}

impl<R: AsyncRead + Unpin> OfpFrameReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_message_size,
            peer: None,
        }
    }

    /// Attach the peer address used in error context
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Next complete message, or `None` on a clean end of stream
    ///
    /// End of stream in the middle of a message is an error.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.try_split_frame()? {
                return Ok(Some(frame));
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.reader.read_buf(&mut self.buffer).await.map_err(|e| {
                TransportError::connection_with_source("Failed to read from switch", self.peer, e)
            })?;

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::connection(
                    format!(
                        "Stream closed with {} bytes of a partial message buffered",
                        self.buffer.len()
                    ),
                    self.peer,
                ));
            }
            trace!(peer = ?self.peer, bytes = n, "Read from switch");
        }
    }

    fn try_split_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < OFP_HEADER_SIZE {
            return Ok(None);
        }

        let header = OfpHeader::parse(&self.buffer)
            .map_err(|e| TransportError::protocol_with_source("Unframeable header", e))?;
        let length = header.length as usize;
        if length > self.max_message_size {
            return Err(TransportError::protocol(format!(
                "Message size {} exceeds maximum {}",
                length, self.max_message_size
            )));
        }

        if self.buffer.len() < length {
            return Ok(None);
        }
        Ok(Some(self.buffer.split_to(length).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn frame(msg_type: u8, xid: u32, body: &[u8]) -> Vec<u8> {
        let mut out = OfpHeader::new(4, msg_type, (8 + body.len()) as u16, xid)
            .encode()
            .to_vec();
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn test_several_messages_in_one_read() {
        let mut bytes = frame(0, 1, &[]);
        bytes.extend(frame(2, 2, &[9, 9]));
        let mut reader = OfpFrameReader::new(bytes.as_slice(), 65535);

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.len(), 8);
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.as_ref(), frame(2, 2, &[9, 9]).as_slice());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fragmented_message() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = OfpFrameReader::new(rx, 65535);
        let bytes = frame(6, 7, &[0u8; 24]);

        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(5) {
                tx.write_all(chunk).await.unwrap();
                tx.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let got = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(got.len(), 32);
        assert_eq!(OfpHeader::parse(&got).unwrap().xid, 7);
        writer.await.unwrap();
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_length_is_fatal() {
        let bytes = [4u8, 0, 0, 3, 0, 0, 0, 1];
        let mut reader = OfpFrameReader::new(&bytes[..], 65535);
        assert!(matches!(
            reader.next_frame().await,
            Err(TransportError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_is_fatal() {
        let bytes = frame(13, 1, &[0u8; 100]);
        let mut reader = OfpFrameReader::new(bytes.as_slice(), 64);
        assert!(matches!(
            reader.next_frame().await,
            Err(TransportError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_message() {
        let bytes = frame(2, 1, &[1, 2, 3, 4]);
        let mut reader = OfpFrameReader::new(&bytes[..10], 65535);
        let err = reader.next_frame().await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
