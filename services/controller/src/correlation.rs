//! # Xid Correlation
//!
//! ## Purpose
//!
//! OpenFlow has no request/response framing of its own; replies are matched
//! to requests by `(peer, xid)`. The [`CorrelationTable`] holds one pending
//! entry per outstanding request and hands the waiting task the type of the
//! first reply that carries its key.
//!
//! ```text
//! register(key) ──► PendingReply ──wait(timeout)──► true / false
//!      │                  ▲
//!      ▼                  │ oneshot
//!   entries ──resolve(key, type)
//! ```
//!
//! Entries are removed on resolution, on timeout (the [`PendingReply`] drop
//! guard) and when the peer disconnects, so the table only ever holds
//! requests that are still in flight.

use crate::error::{ControllerError, ControllerResult};
use codec::expected_reply_type;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

pub type CorrelationKey = (SocketAddr, u32);

/// Reply observed for a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub msg_type: u8,
    pub observed_at: Instant,
}

#[derive(Debug)]
struct PendingEntry {
    seq: u64,
    tx: oneshot::Sender<Resolution>,
}

/// Outstanding requests keyed by `(peer, xid)`
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: DashMap<CorrelationKey, PendingEntry>,
    seq: AtomicU64,
}

/// How a wait ended, before the caller's policy is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Matched,
    WrongType { expected: u8, observed: u8 },
    TimedOut,
    /// Entry was purged, the peer went away
    Abandoned,
}

impl WaitOutcome {
    /// Collapse to a yes/no answer under a fail-open or fail-closed policy
    pub fn accepted(self, fail_open: bool) -> bool {
        match self {
            Self::Matched => true,
            Self::TimedOut => fail_open,
            Self::WrongType { .. } | Self::Abandoned => false,
        }
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `key`; an outstanding entry for the same key is an error
    pub fn register(
        self: &Arc<Self>,
        key: CorrelationKey,
        request_type: u8,
    ) -> ControllerResult<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        match self.entries.entry(key) {
            Entry::Occupied(_) => {
                return Err(ControllerError::DuplicateCorrelation {
                    peer: key.0,
                    xid: key.1,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingEntry { seq, tx });
            }
        }

        trace!(peer = %key.0, xid = key.1, request_type, "Correlation registered");
        Ok(PendingReply {
            table: Arc::clone(self),
            key,
            seq,
            request_type,
            rx: Some(rx),
        })
    }

    /// Deliver a reply to whoever waits on `key`
    ///
    /// Returns false when nobody does (a duplicate or late reply).
    pub fn resolve(&self, key: CorrelationKey, msg_type: u8, observed_at: Instant) -> bool {
        match self.entries.remove(&key) {
            Some((_, entry)) => {
                // The waiter may have given up between removal and send
                let _ = entry.tx.send(Resolution {
                    msg_type,
                    observed_at,
                });
                true
            }
            None => {
                trace!(peer = %key.0, xid = key.1, msg_type, "No pending request for reply");
                false
            }
        }
    }

    /// Drop every entry belonging to `peer`; returns how many were dropped
    pub fn purge_peer(&self, peer: SocketAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.0 != peer);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(peer = %peer, purged, "Purged pending requests");
        }
        purged
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_if_current(&self, key: &CorrelationKey, seq: u64) {
        self.entries.remove_if(key, |_, entry| entry.seq == seq);
    }
}

/// Handle for one outstanding request
///
/// Dropping it removes the entry if it is still the one this handle created.
#[derive(Debug)]
pub struct PendingReply {
    table: Arc<CorrelationTable>,
    key: CorrelationKey,
    seq: u64,
    request_type: u8,
    rx: Option<oneshot::Receiver<Resolution>>,
}

impl PendingReply {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    pub fn request_type(&self) -> u8 {
        self.request_type
    }

    /// Wait up to `timeout` and report how the request ended
    pub async fn wait_outcome(mut self, timeout: Duration) -> WaitOutcome {
        let Some(rx) = self.rx.take() else {
            return WaitOutcome::Abandoned;
        };
        let expected = expected_reply_type(self.request_type);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resolution)) if resolution.msg_type == expected => WaitOutcome::Matched,
            Ok(Ok(resolution)) => WaitOutcome::WrongType {
                expected,
                observed: resolution.msg_type,
            },
            Ok(Err(_)) => WaitOutcome::Abandoned,
            Err(_) => {
                debug!(
                    peer = %self.key.0,
                    xid = self.key.1,
                    msg_type = self.request_type,
                    ?timeout,
                    "Request timed out"
                );
                WaitOutcome::TimedOut
            }
        }
    }

    /// Wait up to `timeout`; an unanswered request counts as `fail_open`
    pub async fn wait(self, timeout: Duration, fail_open: bool) -> bool {
        self.wait_outcome(timeout).await.accepted(fail_open)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.remove_if_current(&self.key, self.seq);
    }
}
