//! # OpenFlow Controller
//!
//! ## Purpose
//!
//! Accepts TCP connections from OpenFlow 1.3/1.5 switches, completes the
//! handshake, supervises liveness and decouples switches from applications
//! through the event bus.
//!
//! ## Architecture Role
//!
//! ```text
//!  switches ──TCP──► server ──frames──► ConnectionManager ──► EventRouter ──► bus ──► apps
//!                                           │    ▲                                     │
//!                                  handshake │    │ correlation                         │
//!                                  keepalive ▼    │                                     │
//!                                     SwitchConnection ◄──── rpc (write_json, ...) ◄────┘
//! ```
//!
//! ## Components
//!
//! - [`switch`]: per-connection state, xid allocation, owned tasks
//! - [`manager`]: peer/dpid indexes and the ordered ingestion consumer
//! - [`correlation`]: `(peer, xid)` → pending reply
//! - [`handshake`], [`keepalive`]: per-connection supervisors
//! - [`router`]: switch messages and control signals onto the bus
//! - [`rpc`]: `list_switches`, `write_dpid`, `write_json`
//! - [`server`]: accept loop and reader tasks

pub mod correlation;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod manager;
pub mod router;
pub mod rpc;
pub mod server;
pub mod switch;

#[cfg(test)]
mod test_support;

pub use correlation::{CorrelationTable, PendingReply, WaitOutcome};
pub use error::{ControllerError, ControllerResult};
pub use handshake::{HandshakeFailure, HandshakeOutcome};
pub use keepalive::KeepaliveOutcome;
pub use manager::{ConnectionManager, Inbound};
pub use router::EventRouter;
pub use switch::{HandshakeStatus, SwitchConnection};

use codec::CommandRegistry;
use controller_config::ControllerConfig;
use event_bus::EventBus;
use network::{TcpServer, TcpServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The controller service: configuration, bus and connection manager
pub struct Controller {
    config: ControllerConfig,
    bus: Arc<dyn EventBus>,
    manager: ConnectionManager,
    commands: Arc<CommandRegistry>,
}

impl Controller {
    /// Validate `config` and prepare the service; nothing is bound yet
    pub fn new(config: ControllerConfig, bus: Arc<dyn EventBus>) -> ControllerResult<Self> {
        config.validate()?;
        let manager = ConnectionManager::new(config.clone(), Arc::clone(&bus));
        Ok(Self {
            config,
            bus,
            manager,
            commands: Arc::new(CommandRegistry::with_defaults()),
        })
    }

    /// Replace the `write_json` command table
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn tcp_config(&self) -> TcpServerConfig {
        TcpServerConfig {
            bind_address: self.config.listen_addr(),
            max_message_size: self.config.protocol.max_message_size,
            nodelay: true,
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> ControllerResult<TcpServer> {
        Ok(TcpServer::bind(self.tcp_config()).await?)
    }

    /// Serve switches on `server` until `shutdown` fires
    ///
    /// Starts the ingestion consumer, the application message forwarder and
    /// (when enabled) the RPC methods. On shutdown every connection's tasks
    /// are cancelled and the methods are withdrawn.
    pub async fn run(&self, server: TcpServer, shutdown: CancellationToken) -> ControllerResult<()> {
        let consumer = self.manager.spawn_consumer()?;
        let forwarder = match self.manager.spawn_app_forwarder() {
            Ok(forwarder) => forwarder,
            Err(e) => {
                self.manager.shutdown();
                let _ = consumer.await;
                return Err(e);
            }
        };

        let rpc_enabled = self.config.bus.enable_rpc;
        let registered = if rpc_enabled {
            rpc::register_methods(self.bus.as_ref(), &self.manager, Arc::clone(&self.commands))
        } else {
            Ok(())
        };
        let served = match registered {
            Ok(()) => server::serve(self.manager.clone(), server, shutdown).await,
            Err(e) => Err(e),
        };

        if rpc_enabled {
            rpc::unregister_methods(self.bus.as_ref());
        }
        self.manager.shutdown();
        let _ = tokio::join!(consumer, forwarder);
        info!("Controller stopped");
        served
    }
}
