//! Simulated switches
//!
//! A [`SimulatedSwitch`] opens a TCP connection to the controller, sends its
//! HELLO and answers the requests a real datapath would: FEATURES_REQUEST,
//! ECHO_REQUEST and BARRIER_REQUEST. Everything it receives is also handed to
//! the test through [`SimulatedSwitch::next_message`].

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use codec::{MessageBody, MsgType, OfpMessage, SwitchFeatures};
use network::OfpFrameReader;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MAX_FRAME: usize = u16::MAX as usize;

/// How a simulated switch reacts to controller requests
#[derive(Debug, Clone)]
pub struct SwitchBehavior {
    pub version: u8,
    pub dpid: u64,
    /// Answer FEATURES_REQUEST; `false` stalls the handshake
    pub answer_features: bool,
    /// Answer ECHO_REQUEST
    pub answer_echo: bool,
    /// Answer BARRIER_REQUEST
    pub answer_barrier: bool,
}

impl SwitchBehavior {
    pub fn new(version: u8, dpid: u64) -> Self {
        Self {
            version,
            dpid,
            answer_features: true,
            answer_echo: true,
            answer_barrier: true,
        }
    }

    pub fn silent_features(mut self) -> Self {
        self.answer_features = false;
        self
    }
}

pub struct SimulatedSwitch {
    behavior: SwitchBehavior,
    local_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Bytes>,
    received: mpsc::UnboundedReceiver<OfpMessage>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SimulatedSwitch {
    /// Connect to `controller` and send HELLO
    pub async fn connect(controller: SocketAddr, behavior: SwitchBehavior) -> Result<Self> {
        let stream = TcpStream::connect(controller)
            .await
            .with_context(|| format!("Failed to connect to {}", controller))?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let (read_half, mut write_half) = stream.into_split();

        let hello = OfpMessage::hello(behavior.version, &[behavior.version]);
        write_half.write_all(&hello.encode()?).await?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let (received_tx, received) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let replies = outbound.clone();
        let sim = behavior.clone();
        let mut reader = OfpFrameReader::new(read_half, MAX_FRAME);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if write_half.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    frame = reader.next_frame() => {
                        let message = match frame {
                            Ok(Some(frame)) => match OfpMessage::decode(&frame) {
                                Ok(message) => message,
                                Err(e) => {
                                    debug!(dpid = sim.dpid, "Undecodable frame: {}", e);
                                    continue;
                                }
                            },
                            _ => break,
                        };
                        if let Some(reply) = answer(&sim, &message) {
                            if let Ok(frame) = reply.encode() {
                                let _ = replies.send(frame);
                            }
                        }
                        if received_tx.send(message).is_err() {
                            break;
                        }
                    }
                }
            }
            // Dropping both halves closes the socket
        });

        Ok(Self {
            behavior,
            local_addr,
            outbound,
            received,
            cancel,
            task: Some(task),
        })
    }

    pub fn dpid(&self) -> u64 {
        self.behavior.dpid
    }

    pub fn version(&self) -> u8 {
        self.behavior.version
    }

    /// Address the controller sees as this switch's peer
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send an unsolicited message
    pub fn send(&self, mut message: OfpMessage, xid: u32) -> Result<()> {
        message.xid = xid;
        self.outbound
            .send(message.encode()?)
            .map_err(|_| anyhow!("switch {} is disconnected", self.behavior.dpid))
    }

    /// Packet-in carrying `payload` as its raw body
    pub fn send_packet_in(&self, payload: &[u8]) -> Result<()> {
        let body = MessageBody::Raw {
            msg_type: MsgType::PacketIn as u8,
            payload: Bytes::copy_from_slice(payload),
        };
        self.send(OfpMessage::new(self.behavior.version, body), 0)
    }

    /// Next message received from the controller
    pub async fn next_message(&mut self, within: Duration) -> Result<OfpMessage> {
        tokio::time::timeout(within, self.received.recv())
            .await
            .map_err(|_| anyhow!("no message from the controller within {:?}", within))?
            .ok_or_else(|| anyhow!("connection closed"))
    }

    /// Skip messages until one of type `msg_type` arrives
    pub async fn expect_type(&mut self, msg_type: MsgType, within: Duration) -> Result<OfpMessage> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let message = self.next_message(remaining).await?;
            if message.msg_type() == msg_type as u8 {
                return Ok(message);
            }
        }
    }

    /// Close the TCP connection
    pub async fn disconnect(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SimulatedSwitch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn answer(behavior: &SwitchBehavior, request: &OfpMessage) -> Option<OfpMessage> {
    let body = match &request.body {
        MessageBody::FeaturesRequest if behavior.answer_features => {
            MessageBody::FeaturesReply(SwitchFeatures {
                datapath_id: behavior.dpid,
                n_buffers: 256,
                n_tables: 254,
                ..Default::default()
            })
        }
        MessageBody::EchoRequest(echo) if behavior.answer_echo => {
            MessageBody::EchoReply(echo.clone())
        }
        MessageBody::BarrierRequest if behavior.answer_barrier => MessageBody::BarrierReply,
        _ => return None,
    };
    let mut reply = OfpMessage::new(request.version, body);
    reply.xid = request.xid;
    Some(reply)
}
