//! # Keepalive
//!
//! One task per handshake-complete connection. Every interval an echo
//! request goes out through the correlation table; an answered probe resets
//! the budget, an unanswered one spends from it. When the budget is empty
//! the loop stops and reports the switch unresponsive. The connection is
//! left open.

use crate::manager::ConnectionManager;
use crate::switch::SwitchConnection;
use codec::OfpMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    Cancelled,
    Unresponsive { missed: u32 },
}

pub async fn run_keepalive(
    manager: &ConnectionManager,
    switch: &SwitchConnection,
    cancel: CancellationToken,
) -> KeepaliveOutcome {
    let settings = manager.config().keepalive.clone();
    let version = switch
        .version()
        .unwrap_or_else(|| manager.fallback_version());
    let mut remaining = settings.max_missed;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return KeepaliveOutcome::Cancelled,
            _ = tokio::time::sleep(settings.interval()) => {}
        }

        let probe = tokio::select! {
            _ = cancel.cancelled() => return KeepaliveOutcome::Cancelled,
            probe = manager.write_message_outcome(switch, OfpMessage::echo_request(version)) => probe,
        };

        let answered = match probe {
            Ok(outcome) => outcome.accepted(settings.fail_open),
            Err(e) if e.is_disconnect() => return KeepaliveOutcome::Cancelled,
            Err(e) => {
                warn!(peer = %switch.peer(), error = %e, "Echo request failed");
                false
            }
        };

        if answered {
            remaining = settings.max_missed;
            continue;
        }

        remaining = remaining.saturating_sub(1);
        warn!(
            peer = %switch.peer(),
            dpid = ?switch.dpid(),
            remaining,
            "Echo request unanswered"
        );
        if remaining == 0 {
            error!(
                peer = %switch.peer(),
                dpid = ?switch.dpid(),
                missed = settings.max_missed,
                "Switch unresponsive, stopping keepalive"
            );
            return KeepaliveOutcome::Unresponsive {
                missed: settings.max_missed,
            };
        }
        debug!(peer = %switch.peer(), "Next echo request in {:?}", settings.interval());
    }
}
