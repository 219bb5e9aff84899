//! Fake switches for unit tests: a [`ChannelWriter`] stands in for the
//! socket and frames are fed straight into [`ConnectionManager::process`].

use crate::manager::{ConnectionManager, Inbound};
use crate::switch::{SwitchConnection, TaskKind};
use bytes::Bytes;
use codec::{MessageBody, MsgType, OfpMessage, SwitchFeatures};
use controller_config::ControllerConfig;
use event_bus::LocalBus;
use network::ChannelWriter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Defaults with keepalive pushed out of the way
pub fn fast_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.keepalive.interval_ms = 60_000;
    config
}

pub fn manager(config: ControllerConfig) -> (ConnectionManager, LocalBus) {
    let bus = LocalBus::default();
    (ConnectionManager::new(config, Arc::new(bus.clone())), bus)
}

pub fn fake_switch(
    manager: &ConnectionManager,
    n: u16,
) -> (Arc<SwitchConnection>, UnboundedReceiver<Bytes>) {
    let peer: SocketAddr = format!("10.0.0.{}:{}", n, 40000 + n).parse().unwrap();
    let (writer, rx) = ChannelWriter::channel(Some(peer));
    (manager.add_switch(peer, Arc::new(writer)), rx)
}

pub fn encode(mut message: OfpMessage, xid: u32) -> Bytes {
    message.xid = xid;
    message.encode().unwrap()
}

pub fn features_reply(version: u8, xid: u32, dpid: u64) -> Bytes {
    let features = SwitchFeatures {
        datapath_id: dpid,
        n_buffers: 256,
        n_tables: 254,
        ..Default::default()
    };
    encode(OfpMessage::new(version, MessageBody::FeaturesReply(features)), xid)
}

/// Packet-in whose one-byte body identifies it
pub fn packet_in(version: u8, marker: u8) -> Bytes {
    let body = MessageBody::Raw {
        msg_type: MsgType::PacketIn as u8,
        payload: Bytes::from(vec![marker]),
    };
    encode(OfpMessage::new(version, body), 0)
}

pub async fn next_message(rx: &mut UnboundedReceiver<Bytes>) -> OfpMessage {
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no frame written to the switch")
        .expect("writer closed");
    OfpMessage::decode(&frame).unwrap()
}

/// Walk a fake switch through the handshake until `dpid` is indexed
pub async fn connect(
    manager: &ConnectionManager,
    rx: &mut UnboundedReceiver<Bytes>,
    peer: SocketAddr,
    version: u8,
    dpid: u64,
) {
    manager
        .process(Inbound::Frame {
            peer,
            frame: encode(OfpMessage::hello(version, &[version]), 1),
        })
        .await;
    assert_eq!(next_message(rx).await.msg_type(), MsgType::Hello as u8);
    let request = next_message(rx).await;
    assert_eq!(request.msg_type(), MsgType::FeaturesRequest as u8);

    manager
        .process(Inbound::Frame {
            peer,
            frame: features_reply(version, request.xid, dpid),
        })
        .await;

    // Keepalive starts last, after the connected event
    for _ in 0..500 {
        let ready = manager
            .switch_by_dpid(dpid)
            .is_some_and(|s| s.has_running_task(TaskKind::Keepalive));
        if ready {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("switch {} never completed the handshake", dpid);
}

/// Answer the next request written to the switch with `body`; yields the request
pub fn answer_next(
    manager: ConnectionManager,
    peer: SocketAddr,
    mut rx: UnboundedReceiver<Bytes>,
    body: MessageBody,
) -> JoinHandle<OfpMessage> {
    tokio::spawn(async move {
        let request = next_message(&mut rx).await;
        let reply = encode(OfpMessage::new(request.version, body), request.xid);
        manager.process(Inbound::Frame { peer, frame: reply }).await;
        request
    })
}
