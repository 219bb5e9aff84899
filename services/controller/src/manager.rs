//! # Connection Manager
//!
//! ## Purpose
//!
//! Owns the switch indexes and the single ordered processing path for
//! everything switches send.
//!
//! ## Architecture Role
//!
//! ```text
//! reader task (peer A) ──┐
//! reader task (peer B) ──┼──► ingest queue (FIFO) ──► consumer ──► handshake / echo
//! reader task (peer C) ──┘          ▲                    │      ──► correlation.resolve
//!                                   │                    └────► EventRouter
//!                         Closed{peer} on EOF
//! ```
//!
//! Reads are concurrent across connections, but every decision about a
//! message (version, handshake, correlation, routing) is made by one
//! consumer in arrival order. A connection's disconnect travels through the
//! same queue, so its last messages are handled before it is removed.
//!
//! ## Indexes
//!
//! - `peers`: every accepted connection, from accept until disconnect
//! - `dpids`: handshake-complete connections only
//!
//! `Closed` names the connection, not just its address, so a late close
//! from a replaced connection never removes its successor.

use crate::correlation::{CorrelationTable, WaitOutcome};
use crate::error::{ControllerError, ControllerResult};
use crate::handshake::run_handshake;
use crate::keepalive::{run_keepalive, KeepaliveOutcome};
use crate::router::EventRouter;
use crate::switch::{SwitchConnection, TaskHandle, TaskKind, VersionCheck};
use bytes::{Bytes, BytesMut};
use codec::{
    expected_reply_type, stamp_xid, MessageBody, MsgType, OfpHeader, OfpMessage, ProtocolError,
};
use controller_config::ControllerConfig;
use dashmap::DashMap;
use event_bus::{
    control, decode_app_ofp_payload, BusEvent, ControlPayload, EventBus, EventClass,
};
use network::FrameWriter;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bus subscriber name used for application-originated OpenFlow messages
pub const APP_FORWARDER: &str = "controller.app_ofp";

/// Item on the ingestion queue
#[derive(Debug)]
pub enum Inbound {
    Frame { peer: SocketAddr, frame: Bytes },
    Closed { switch: Arc<SwitchConnection> },
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ControllerConfig,
    peers: DashMap<SocketAddr, Arc<SwitchConnection>>,
    dpids: DashMap<u64, Arc<SwitchConnection>>,
    correlation: Arc<CorrelationTable>,
    router: EventRouter,
    ingest_tx: mpsc::UnboundedSender<Inbound>,
    ingest_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    shutdown: CancellationToken,
    /// Serializes dpid indexing with the connected/disconnected events
    lifecycle: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(config: ControllerConfig, bus: Arc<dyn EventBus>) -> Self {
        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ManagerInner {
                config,
                peers: DashMap::new(),
                dpids: DashMap::new(),
                correlation: Arc::new(CorrelationTable::new()),
                router: EventRouter::new(bus),
                ingest_tx,
                ingest_rx: Mutex::new(Some(ingest_rx)),
                shutdown: CancellationToken::new(),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }

    pub fn correlation(&self) -> &Arc<CorrelationTable> {
        &self.inner.correlation
    }

    /// Version used for messages to a switch that has not negotiated one
    pub(crate) fn fallback_version(&self) -> u8 {
        self.inner
            .config
            .protocol
            .versions
            .iter()
            .copied()
            .max()
            .unwrap_or(codec::OFP_VERSION_1_5)
    }

    // ── Indexes ────────────────────────────────────────────────────────

    /// Register a freshly accepted connection
    ///
    /// A connection still registered under the same address is closed and
    /// queued for removal ahead of anything the new one sends.
    pub fn add_switch(&self, peer: SocketAddr, writer: Arc<dyn FrameWriter>) -> Arc<SwitchConnection> {
        let switch = Arc::new(SwitchConnection::new(peer, writer));
        if let Some(stale) = self.inner.peers.insert(peer, Arc::clone(&switch)) {
            warn!(peer = %peer, dpid = ?stale.dpid(), "Replacing stale connection for reused peer address");
            stale.close();
            self.enqueue_closed(&stale);
        }
        debug!(peer = %peer, "Switch connection added");
        switch
    }

    pub fn switch_by_peer(&self, peer: &SocketAddr) -> Option<Arc<SwitchConnection>> {
        self.inner.peers.get(peer).map(|s| Arc::clone(s.value()))
    }

    pub fn switch_by_dpid(&self, dpid: u64) -> Option<Arc<SwitchConnection>> {
        self.inner.dpids.get(&dpid).map(|s| Arc::clone(s.value()))
    }

    /// Datapath ids of handshake-complete switches, ascending
    pub fn list_switches(&self) -> Vec<u64> {
        let mut dpids: Vec<u64> = self.inner.dpids.iter().map(|e| *e.key()).collect();
        dpids.sort_unstable();
        dpids
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn dpid_count(&self) -> usize {
        self.inner.dpids.len()
    }

    // ── Ingestion ──────────────────────────────────────────────────────

    /// Queue a frame read from `peer`; false once the manager has stopped
    pub fn enqueue_frame(&self, peer: SocketAddr, frame: Bytes) -> bool {
        self.inner
            .ingest_tx
            .send(Inbound::Frame { peer, frame })
            .is_ok()
    }

    /// Queue the end of `switch`'s connection
    pub fn enqueue_closed(&self, switch: &Arc<SwitchConnection>) -> bool {
        self.inner
            .ingest_tx
            .send(Inbound::Closed {
                switch: Arc::clone(switch),
            })
            .is_ok()
    }

    /// Start the single ingestion consumer
    pub fn spawn_consumer(&self) -> ControllerResult<JoinHandle<()>> {
        let mut rx = self
            .inner
            .ingest_rx
            .lock()
            .take()
            .ok_or(ControllerError::AlreadyStarted)?;
        let manager = self.clone();

        Ok(tokio::spawn(async move {
            info!("📥 Ingestion consumer started");
            loop {
                let inbound = tokio::select! {
                    biased;
                    _ = manager.inner.shutdown.cancelled() => break,
                    inbound = rx.recv() => match inbound {
                        Some(inbound) => inbound,
                        None => break,
                    },
                };
                manager.process(inbound).await;
            }
            info!("Ingestion consumer stopped");
        }))
    }

    /// Handle one queued item
    pub async fn process(&self, inbound: Inbound) {
        match inbound {
            Inbound::Frame { peer, frame } => self.process_frame(peer, frame).await,
            Inbound::Closed { switch } => {
                self.remove_connection(&switch).await;
            }
        }
    }

    async fn process_frame(&self, peer: SocketAddr, frame: Bytes) {
        let header = match OfpHeader::parse(&frame) {
            Ok(header) => header,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping frame without a valid header");
                return;
            }
        };

        let Some(switch) = self.switch_by_peer(&peer) else {
            debug!(peer = %peer, xid = header.xid, "Frame from unknown peer, dropping");
            return;
        };

        match switch.negotiate_version(header.version, &self.inner.config.protocol.versions) {
            VersionCheck::Accepted => {}
            VersionCheck::Negotiated => {
                info!(peer = %peer, version = header.version, "OpenFlow version negotiated");
            }
            VersionCheck::Unsupported => {
                error!(
                    peer = %peer,
                    version = header.version,
                    msg_type = header.msg_type,
                    supported = ?self.inner.config.protocol.versions,
                    "Unsupported OpenFlow version, dropping message"
                );
                return;
            }
            VersionCheck::Mismatch { negotiated } => {
                error!(
                    peer = %peer,
                    version = header.version,
                    negotiated,
                    msg_type = header.msg_type,
                    "Version differs from the negotiated one, dropping message"
                );
                return;
            }
        }

        debug!(
            peer = %peer,
            msg_type = %MsgType::name_of(header.msg_type),
            xid = header.xid,
            length = header.length,
            "Message in"
        );

        let complete = switch.is_complete();
        if !complete {
            self.handle_incomplete(&switch, &header, &frame);
        } else if header.msg_type == MsgType::EchoRequest as u8 {
            self.reply_echo(&switch, &header, &frame);
        }

        if is_correlatable(header.msg_type) {
            let now = Instant::now();
            if self
                .inner
                .correlation
                .resolve((peer, header.xid), header.msg_type, now)
            {
                switch.record_round_trip(now);
            }
        }

        if complete && EventRouter::is_routable(header.version, header.msg_type) {
            if let Err(e) = self
                .inner
                .router
                .route(header.version, header.msg_type, switch.dpid(), frame)
                .await
            {
                warn!(peer = %peer, error = %e, "Failed to publish switch message");
            }
        }
    }

    fn handle_incomplete(&self, switch: &Arc<SwitchConnection>, header: &OfpHeader, frame: &Bytes) {
        let peer = switch.peer();
        match MsgType::try_from(header.msg_type) {
            Ok(MsgType::Hello) => {
                if switch.begin_handshake() {
                    info!(peer = %peer, "🤝 Hello received, starting handshake");
                    self.start_handshake(Arc::clone(switch));
                } else {
                    debug!(peer = %peer, "Repeated hello ignored");
                }
            }
            Ok(MsgType::EchoRequest) => self.reply_echo(switch, header, frame),
            Ok(MsgType::FeaturesReply) => match OfpMessage::decode_with_header(header, frame) {
                Ok(OfpMessage {
                    body: MessageBody::FeaturesReply(features),
                    ..
                }) => {
                    if switch.set_dpid(features.datapath_id) {
                        debug!(
                            peer = %peer,
                            dpid = features.datapath_id,
                            n_tables = features.n_tables,
                            "Features reply received"
                        );
                    } else {
                        warn!(
                            peer = %peer,
                            dpid = features.datapath_id,
                            current = ?switch.dpid(),
                            "Switch reported a different dpid, keeping the first"
                        );
                    }
                }
                Ok(other) => warn!(peer = %peer, body = ?other.body, "Unexpected features reply body"),
                Err(e) => error!(peer = %peer, error = %e, "Malformed features reply, dropping"),
            },
            _ => debug!(
                peer = %peer,
                msg_type = %MsgType::name_of(header.msg_type),
                "Ignoring message before handshake completes"
            ),
        }
    }

    /// Answer an echo request with the same xid and data
    fn reply_echo(&self, switch: &SwitchConnection, header: &OfpHeader, frame: &Bytes) {
        let data = match OfpMessage::decode_with_header(header, frame) {
            Ok(OfpMessage {
                body: MessageBody::EchoRequest(echo),
                ..
            }) => echo.data,
            Ok(_) => Bytes::new(),
            Err(e) => {
                error!(peer = %switch.peer(), error = %e, "Malformed echo request, dropping");
                return;
            }
        };

        let mut reply = OfpMessage::echo_reply(header.version, data);
        reply.xid = header.xid;
        if let Err(e) = switch.send(&reply) {
            warn!(peer = %switch.peer(), error = %e, "Failed to send echo reply");
        }
    }

    /// Tear down whatever connection is registered at `peer`; true if one was
    pub async fn remove_switch(&self, peer: SocketAddr) -> bool {
        let Some((_, switch)) = self.inner.peers.remove(&peer) else {
            debug!(peer = %peer, "Close for unknown peer");
            return false;
        };
        self.retire(&switch).await;
        true
    }

    /// Tear down `switch`; true if it was still the registered connection
    /// for its address
    pub async fn remove_connection(&self, switch: &Arc<SwitchConnection>) -> bool {
        let registered = self
            .inner
            .peers
            .remove_if(&switch.peer(), |_, current| Arc::ptr_eq(current, switch))
            .is_some();
        self.retire(switch).await;
        registered
    }

    /// Close `switch`, unindex its dpid and announce the disconnect
    ///
    /// Safe to repeat: only the call that removes the dpid entry publishes
    /// `switch.disconnected`.
    async fn retire(&self, switch: &Arc<SwitchConnection>) {
        let peer = switch.peer();
        switch.close();

        // Pending entries are keyed by address; leave a successor's alone
        let purged = if self.inner.peers.contains_key(&peer) {
            0
        } else {
            self.inner.correlation.purge_peer(peer)
        };

        if let Some(dpid) = switch.dpid() {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let unindexed = self
                .inner
                .dpids
                .remove_if(&dpid, |_, indexed| Arc::ptr_eq(indexed, switch))
                .is_some();
            if unindexed {
                info!("🔌 Switch {:#018x} disconnected ({})", dpid, peer);
                self.inner
                    .router
                    .publish_control(control::SWITCH_DISCONNECTED, &ControlPayload::dpid(dpid))
                    .await;
            }
        }

        debug!(peer = %peer, purged, "Connection removed");
    }

    // ── Handshake and keepalive ────────────────────────────────────────

    fn start_handshake(&self, switch: Arc<SwitchConnection>) {
        let cancel = switch.child_token();
        let token = cancel.clone();
        let manager = self.clone();
        let task_switch = Arc::clone(&switch);

        let join = tokio::spawn(async move {
            let outcome = run_handshake(&manager, &task_switch, token).await;
            debug!(peer = %task_switch.peer(), ?outcome, "Handshake task finished");
        });
        switch.attach_task(TaskHandle::new(TaskKind::Handshake, cancel, join));
    }

    /// Mark `switch` complete under `dpid`, announce it and start probing
    ///
    /// Returns false when the connection went away in the meantime.
    pub(crate) async fn complete_handshake(&self, switch: &Arc<SwitchConnection>, dpid: u64) -> bool {
        if !switch.mark_complete() {
            return false;
        }

        // Teardown closes before taking this lock, so a close is either seen
        // here or its disconnected event follows ours
        let lifecycle = self.inner.lifecycle.lock().await;
        if switch.is_closed() {
            return false;
        }

        if let Some(previous) = self.inner.dpids.insert(dpid, Arc::clone(switch)) {
            if !Arc::ptr_eq(&previous, switch) {
                warn!(
                    dpid,
                    peer = %switch.peer(),
                    previous = %previous.peer(),
                    "Dpid reconnected, replacing the previous connection"
                );
            }
        }

        info!(
            "✅ Switch {:#018x} connected from {} (OpenFlow version {:?})",
            dpid,
            switch.peer(),
            switch.version()
        );
        self.inner
            .router
            .publish_control(control::SWITCH_CONNECTED, &ControlPayload::dpid(dpid))
            .await;
        drop(lifecycle);

        self.start_keepalive(Arc::clone(switch));
        true
    }

    fn start_keepalive(&self, switch: Arc<SwitchConnection>) {
        let cancel = switch.child_token();
        let token = cancel.clone();
        let manager = self.clone();
        let task_switch = Arc::clone(&switch);

        let join = tokio::spawn(async move {
            if let KeepaliveOutcome::Unresponsive { missed } =
                run_keepalive(&manager, &task_switch, token).await
            {
                let payload = match task_switch.dpid() {
                    Some(dpid) => ControlPayload::dpid(dpid),
                    None => ControlPayload::peer(task_switch.peer()),
                };
                debug!(peer = %task_switch.peer(), missed, "Publishing unresponsive switch");
                manager
                    .inner
                    .router
                    .publish_control(control::SWITCH_UNRESPONSIVE, &payload)
                    .await;
            }
        });
        switch.attach_task(TaskHandle::new(TaskKind::Keepalive, cancel, join));
    }

    // ── Writes ─────────────────────────────────────────────────────────

    /// Send `message` under a fresh xid and wait for its reply
    pub async fn write_message_outcome(
        &self,
        switch: &SwitchConnection,
        mut message: OfpMessage,
    ) -> ControllerResult<WaitOutcome> {
        message.xid = switch.allocate_xid();
        let pending = self
            .inner
            .correlation
            .register((switch.peer(), message.xid), message.msg_type())?;
        switch.send(&message)?;

        let timeout = self
            .inner
            .config
            .correlation
            .timeout_for(switch.latency_estimate());
        Ok(pending.wait_outcome(timeout).await)
    }

    /// Send `message` and wait; an unanswered request counts as `fail_open`
    pub async fn write_switch_wait(
        &self,
        switch: &SwitchConnection,
        message: OfpMessage,
        fail_open: bool,
    ) -> ControllerResult<bool> {
        let outcome = self.write_message_outcome(switch, message).await?;
        log_outcome(switch, outcome);
        Ok(outcome.accepted(fail_open))
    }

    /// Like [`Self::write_switch_wait`] for an already-encoded message
    ///
    /// The frame is re-stamped with the connection's next xid.
    pub async fn write_frame_wait(
        &self,
        switch: &SwitchConnection,
        frame: &[u8],
        fail_open: bool,
    ) -> ControllerResult<bool> {
        let (header, frame) = restamp(switch, frame)?;
        let pending = self
            .inner
            .correlation
            .register((switch.peer(), header.xid), header.msg_type)?;
        switch.send_frame(frame)?;

        let timeout = self
            .inner
            .config
            .correlation
            .timeout_for(switch.latency_estimate());
        let outcome = pending.wait_outcome(timeout).await;
        log_outcome(switch, outcome);
        Ok(outcome.accepted(fail_open))
    }

    /// Send an already-encoded message without waiting; returns its xid
    pub fn send_frame(&self, switch: &SwitchConnection, frame: &[u8]) -> ControllerResult<u32> {
        let (header, frame) = restamp(switch, frame)?;
        switch.send_frame(frame)?;
        Ok(header.xid)
    }

    // ── Application messages ───────────────────────────────────────────

    /// Forward `AppOFPEvent`s from the bus to their target switches
    pub fn spawn_app_forwarder(&self) -> ControllerResult<JoinHandle<()>> {
        let pattern = EventClass::AppOFPEvent.wildcard();
        let bus = Arc::clone(self.inner.router.bus());
        let mut subscription = bus.subscribe(APP_FORWARDER, &[pattern.as_str()])?;
        let manager = self.clone();

        Ok(tokio::spawn(async move {
            debug!("Forwarding {} to switches", pattern);
            loop {
                let event = tokio::select! {
                    _ = manager.inner.shutdown.cancelled() => break,
                    event = subscription.recv() => event,
                };
                let Some(event) = event else { break };
                manager.forward_app_message(&event);
            }
            let _ = bus.unsubscribe(APP_FORWARDER);
        }))
    }

    fn forward_app_message(&self, event: &BusEvent) {
        let (dpid, frame) = match decode_app_ofp_payload(&event.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(key = %event.routing_key, error = %e, "Dropping application message");
                return;
            }
        };
        let Some(switch) = self.switch_by_dpid(dpid) else {
            warn!(key = %event.routing_key, dpid, "Application message for inexistent dpid");
            return;
        };
        match self.send_frame(&switch, &frame) {
            Ok(xid) => debug!(dpid, xid, key = %event.routing_key, "Forwarded application message"),
            Err(e) => warn!(dpid, error = %e, "Failed to forward application message"),
        }
    }

    // ── Shutdown ───────────────────────────────────────────────────────

    /// Stop the consumer and cancel every connection's tasks
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let switches: Vec<Arc<SwitchConnection>> = self
            .inner
            .peers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for switch in &switches {
            switch.close();
        }
        info!(connections = switches.len(), "Connection manager shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

/// Whether a message from the switch may answer one of our requests
///
/// Hello and request types travel in the switch's own xid space.
fn is_correlatable(msg_type: u8) -> bool {
    msg_type != MsgType::Hello as u8 && expected_reply_type(msg_type) == msg_type
}

/// Copy `frame` (trimmed to its header length) under the switch's next xid
fn restamp(switch: &SwitchConnection, frame: &[u8]) -> ControllerResult<(OfpHeader, Bytes)> {
    let mut header = OfpHeader::parse(frame)?;
    let length = header.length as usize;
    if frame.len() < length {
        return Err(ProtocolError::message_too_small(length, frame.len(), "raw message").into());
    }

    let mut buf = BytesMut::from(&frame[..length]);
    header.xid = switch.allocate_xid();
    stamp_xid(&mut buf, header.xid)?;
    Ok((header, buf.freeze()))
}

fn log_outcome(switch: &SwitchConnection, outcome: WaitOutcome) {
    match outcome {
        WaitOutcome::Matched => {}
        WaitOutcome::WrongType { expected, observed } => warn!(
            peer = %switch.peer(),
            expected = %MsgType::name_of(expected),
            observed = %MsgType::name_of(observed),
            "Wrong reply type"
        ),
        WaitOutcome::TimedOut => debug!(peer = %switch.peer(), "Request unanswered"),
        WaitOutcome::Abandoned => debug!(peer = %switch.peer(), "Request abandoned on disconnect"),
    }
}
