//! Transport Layer
//!
//! Switches connect to the controller over plain TCP. Each accepted stream is
//! split into an [`OfpFrameReader`](crate::OfpFrameReader) on the read half
//! and a writer task on the write half.

pub mod tcp;

pub use tcp::{SwitchStream, TcpServer, TcpServerConfig};
