//! Event handler dispatch loop

use crate::client::{AppClient, AppCommands, AppEvent};
use crate::error::AppResult;
use async_trait::async_trait;
use codec::OfpMessage;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Application callbacks, one per event family
#[async_trait]
pub trait EventHandler: Send {
    /// Unsolicited OpenFlow message from switch `dpid`
    async fn on_ofp_message(
        &mut self,
        commands: &AppCommands,
        dpid: Option<u64>,
        message: OfpMessage,
    ) -> AppResult<()>;

    /// Controller signal such as `switch.connected`
    async fn on_control_event(
        &mut self,
        _commands: &AppCommands,
        _name: &str,
        _payload: Value,
    ) -> AppResult<()> {
        Ok(())
    }
}

impl AppClient {
    /// Connect if needed and dispatch events to `handler` until `shutdown`
    /// fires or the bus closes the subscription
    ///
    /// Handler errors are logged; they do not stop the loop.
    pub async fn run<H: EventHandler>(
        &mut self,
        handler: &mut H,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        if !self.is_connected() {
            self.connect()?;
        }
        let commands = self.commands();
        info!("🚀 {} running", self.name());

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.next_event() => event?,
            };
            let Some(event) = event else { break };

            let outcome = match event {
                AppEvent::OpenFlow { dpid, message, .. } => {
                    handler.on_ofp_message(&commands, dpid, message).await
                }
                AppEvent::Control { name, payload } => {
                    handler.on_control_event(&commands, &name, payload).await
                }
            };
            if let Err(e) = outcome {
                error!(app = %self.name(), "Handler failed: {}", e);
            }
        }

        info!("{} stopped", self.name());
        Ok(())
    }
}
