//! # Switch Connection
//!
//! ## Purpose
//!
//! Everything the controller knows about one TCP-connected switch: peer
//! address, negotiated version, datapath id, handshake status, the xid
//! allocator, the observed round-trip latency and the tasks that exist for
//! this connection only.
//!
//! ## Ownership
//!
//! ```text
//! ConnectionManager ──Arc──► SwitchConnection ──owns──► TaskHandle (reader)
//!                                           ├──owns──► TaskHandle (handshake)
//!                                           └──owns──► TaskHandle (keepalive)
//! ```
//!
//! Tasks get child tokens of the connection's [`CancellationToken`];
//! [`SwitchConnection::close`] cancels all of them exactly once.

use crate::error::{ControllerError, ControllerResult};
use bytes::Bytes;
use codec::OfpMessage;
use network::FrameWriter;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Incomplete,
    Complete,
}

/// Tasks a connection can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Reader,
    Handshake,
    Keepalive,
}

/// Owned task: its cancellation token plus join handle
#[derive(Debug)]
pub struct TaskHandle {
    kind: TaskKind,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(kind: TaskKind, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { kind, cancel, join }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Outcome of checking a message's version against the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// First message; the version has now been fixed
    Negotiated,
    /// Matches the negotiated version
    Accepted,
    /// Not in the configured set; nothing was fixed
    Unsupported,
    /// Differs from the version negotiated earlier
    Mismatch { negotiated: u8 },
}

#[derive(Debug)]
struct Latency {
    estimate: Option<Duration>,
    last_seen: Instant,
}

pub struct SwitchConnection {
    peer: SocketAddr,
    writer: Arc<dyn FrameWriter>,
    version: OnceLock<u8>,
    dpid: OnceLock<u64>,
    complete: AtomicBool,
    handshake_started: AtomicBool,
    closed: AtomicBool,
    next_xid: AtomicU32,
    latency: Mutex<Latency>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl std::fmt::Debug for SwitchConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchConnection")
            .field("peer", &self.peer)
            .field("version", &self.version())
            .field("dpid", &self.dpid())
            .field("status", &self.status())
            .finish()
    }
}

impl SwitchConnection {
    pub fn new(peer: SocketAddr, writer: Arc<dyn FrameWriter>) -> Self {
        Self {
            peer,
            writer,
            version: OnceLock::new(),
            dpid: OnceLock::new(),
            complete: AtomicBool::new(false),
            handshake_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_xid: AtomicU32::new(1),
            latency: Mutex::new(Latency {
                estimate: None,
                last_seen: Instant::now(),
            }),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Negotiated wire version, unset until the first supported message
    pub fn version(&self) -> Option<u8> {
        self.version.get().copied()
    }

    /// Datapath id, unset until a features reply arrives
    pub fn dpid(&self) -> Option<u64> {
        self.dpid.get().copied()
    }

    pub fn status(&self) -> HandshakeStatus {
        if self.complete.load(Ordering::Acquire) {
            HandshakeStatus::Complete
        } else {
            HandshakeStatus::Incomplete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == HandshakeStatus::Complete
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fix the version on first use, or check against the fixed one
    pub fn negotiate_version(&self, version: u8, supported: &[u8]) -> VersionCheck {
        if let Some(negotiated) = self.version() {
            return if negotiated == version {
                VersionCheck::Accepted
            } else {
                VersionCheck::Mismatch { negotiated }
            };
        }
        if !supported.contains(&version) {
            return VersionCheck::Unsupported;
        }
        match self.version.set(version) {
            Ok(()) => VersionCheck::Negotiated,
            // Lost a race with another setter
            Err(_) => self.negotiate_version(version, supported),
        }
    }

    /// Store the datapath id; a second, different id is refused
    pub fn set_dpid(&self, dpid: u64) -> bool {
        self.dpid.set(dpid).is_ok() || self.dpid() == Some(dpid)
    }

    /// Transition to Complete; true only for the call that made the transition
    pub fn mark_complete(&self) -> bool {
        !self.complete.swap(true, Ordering::AcqRel)
    }

    /// Claim the right to run the handshake; true exactly once
    pub fn begin_handshake(&self) -> bool {
        !self.handshake_started.swap(true, Ordering::AcqRel)
    }

    /// Next transaction id: monotonically increasing, 0 is skipped on wraparound
    pub fn allocate_xid(&self) -> u32 {
        self.next_xid
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |xid| {
                Some(if xid == u32::MAX { 1 } else { xid + 1 })
            })
            .unwrap_or_else(|xid| xid)
    }

    /// Current latency estimate (minimum observed round trip)
    pub fn latency_estimate(&self) -> Option<Duration> {
        self.latency.lock().estimate
    }

    pub fn last_seen(&self) -> Instant {
        self.latency.lock().last_seen
    }

    /// Fold in a matched reply observed at `observed_at`
    pub fn record_round_trip(&self, observed_at: Instant) {
        let mut latency = self.latency.lock();
        let elapsed = observed_at.saturating_duration_since(latency.last_seen);
        latency.estimate = Some(match latency.estimate {
            Some(current) => current.min(elapsed),
            None => elapsed,
        });
        latency.last_seen = observed_at;
        trace!(peer = %self.peer, ?elapsed, estimate = ?latency.estimate, "Round trip recorded");
    }

    fn touch(&self) {
        self.latency.lock().last_seen = Instant::now();
    }

    /// Queue an already-encoded frame
    pub fn send_frame(&self, frame: Bytes) -> ControllerResult<()> {
        if self.is_closed() {
            return Err(ControllerError::ConnectionClosed(self.peer));
        }
        self.writer.send(frame)?;
        self.touch();
        Ok(())
    }

    /// Encode and queue `message` with the xid it already carries
    pub fn send(&self, message: &OfpMessage) -> ControllerResult<()> {
        let frame = message.encode()?;
        debug!(
            peer = %self.peer,
            msg_type = message.msg_type(),
            xid = message.xid,
            "Writing message"
        );
        self.send_frame(frame)
    }

    /// Assign the next xid to `message`, queue it and return the xid
    pub fn write(&self, message: &mut OfpMessage) -> ControllerResult<u32> {
        message.xid = self.allocate_xid();
        self.send(message)?;
        Ok(message.xid)
    }

    /// Token for a task owned by this connection
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Take ownership of a task; a closed connection cancels it immediately
    pub fn attach_task(&self, task: TaskHandle) {
        let mut tasks = self.tasks.lock();
        if self.is_closed() {
            task.cancel();
            return;
        }
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// True while a task of `kind` is attached and has not finished
    pub fn has_running_task(&self, kind: TaskKind) -> bool {
        self.tasks
            .lock()
            .iter()
            .any(|t| t.kind() == kind && !t.is_finished())
    }

    /// Cancel every owned task; true only for the first call
    pub fn close(&self) -> bool {
        let mut tasks = self.tasks.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        for task in tasks.drain(..) {
            task.cancel();
        }
        debug!(peer = %self.peer, "Connection closed");
        true
    }
}
