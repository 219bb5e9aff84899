//! # Handshake
//!
//! Runs once per connection, started by the switch's first Hello:
//!
//! ```text
//! Incomplete ──hello──► send Hello ──► FeaturesRequest ──reply──► Complete
//!                                            │                      ├─ index dpid
//!                                            └─timeout / wrong type │  publish switch.connected
//!                                                  │                └─ start keepalive
//!                                                  ▼
//!                                   publish switch.handshake_failed
//!                                   (connection stays Incomplete)
//! ```

use crate::correlation::WaitOutcome;
use crate::manager::ConnectionManager;
use crate::switch::SwitchConnection;
use codec::OfpMessage;
use event_bus::{control, ControlPayload};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Completed { dpid: u64 },
    Failed(HandshakeFailure),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeFailure {
    #[error("no OpenFlow version negotiated")]
    NoVersion,

    #[error("features request not answered ({0:?})")]
    NoFeatures(WaitOutcome),

    #[error("features reply carried no datapath id")]
    MissingDpid,

    #[error("write failed: {0}")]
    Write(String),
}

/// Drive the handshake for `switch` until it completes, fails or `cancel` fires
pub async fn run_handshake(
    manager: &ConnectionManager,
    switch: &Arc<SwitchConnection>,
    cancel: CancellationToken,
) -> HandshakeOutcome {
    let exchanged = tokio::select! {
        _ = cancel.cancelled() => return HandshakeOutcome::Cancelled,
        exchanged = exchange(manager, switch) => exchanged,
    };

    match exchanged {
        Ok(dpid) => {
            if manager.complete_handshake(switch, dpid).await {
                HandshakeOutcome::Completed { dpid }
            } else {
                HandshakeOutcome::Cancelled
            }
        }
        Err(failure) => {
            error!(peer = %switch.peer(), %failure, "Handshake failed");
            manager
                .router()
                .publish_control(control::HANDSHAKE_FAILED, &ControlPayload::peer(switch.peer()))
                .await;
            HandshakeOutcome::Failed(failure)
        }
    }
}

async fn exchange(
    manager: &ConnectionManager,
    switch: &SwitchConnection,
) -> Result<u64, HandshakeFailure> {
    let version = switch.version().ok_or(HandshakeFailure::NoVersion)?;

    // Hellos are not correlated
    let mut hello = OfpMessage::hello(version, &manager.config().protocol.versions);
    switch
        .write(&mut hello)
        .map_err(|e| HandshakeFailure::Write(e.to_string()))?;

    info!(peer = %switch.peer(), version, "Requesting switch features");
    let outcome = manager
        .write_message_outcome(switch, OfpMessage::features_request(version))
        .await
        .map_err(|e| HandshakeFailure::Write(e.to_string()))?;

    if !outcome.accepted(manager.config().handshake.fail_open) {
        return Err(HandshakeFailure::NoFeatures(outcome));
    }
    // A fail-open timeout is accepted but leaves no dpid behind
    switch.dpid().ok_or(HandshakeFailure::MissingDpid)
}
