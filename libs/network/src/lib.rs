//! Network Infrastructure
//!
//! Switch-facing transport for the OpenFlow controller: a TCP listener,
//! length-prefixed OpenFlow framing over any `AsyncRead`, and non-blocking
//! per-connection writers.
//!
//! ## Architecture Role
//!
//! ```text
//! switch ──TCP──► TcpServer::accept ──► OfpFrameReader ──► controller ingestion
//!                                   └─► writer task ◄── FrameWriter::send
//! ```

pub mod error;
pub mod framing;
pub mod transports;
pub mod writer;

pub use error::{Result, TransportError};
pub use framing::OfpFrameReader;
pub use transports::{SwitchStream, TcpServer, TcpServerConfig};
pub use writer::{spawn_writer, ChannelWriter, FrameWriter};
