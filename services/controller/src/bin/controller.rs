//! OpenFlow controller binary
//!
//! Usage:
//!   ofctl
//!   ofctl --config config/controller.toml
//!   ofctl --address 0.0.0.0 --port 6633 --versions 4 --monitor

use anyhow::{Context, Result};
use apps::{AppClient, AppCommands, AppRegistry, AppResult, EventHandler};
use async_trait::async_trait;
use clap::Parser;
use codec::{MsgType, OfpMessage};
use controller::Controller;
use controller_config::{ControllerConfig, DEFAULT_ENV_PREFIX};
use event_bus::{EventBus, LocalBus, LocalBusConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ofctl")]
#[command(about = "OpenFlow 1.3/1.5 controller")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    address: Option<String>,

    /// Listen port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Accepted OpenFlow versions, e.g. 4,6
    #[arg(long, value_delimiter = ',')]
    versions: Option<Vec<u8>>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Do not serve list_switches / write_dpid / write_json
    #[arg(long)]
    no_rpc: bool,

    /// Log switch lifecycle events and unsolicited messages
    #[arg(long)]
    monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting OpenFlow controller");
    let config = load_config(&args)?;
    info!(
        "Listening on {} for OpenFlow versions {:?}",
        config.listen_addr(),
        config.protocol.versions
    );

    let bus = LocalBus::new(LocalBusConfig {
        subscriber_capacity: config.bus.subscriber_capacity,
        rpc_timeout: config.bus.rpc_timeout(),
    });
    let bus: Arc<dyn EventBus> = Arc::new(bus);

    let controller = Controller::new(config, Arc::clone(&bus))?;
    let server = controller.bind().await?;

    let shutdown = CancellationToken::new();
    let registry = AppRegistry::new();
    let monitor = if args.monitor {
        let mut client = AppClient::new("monitor", Arc::clone(&bus), &registry)?;
        client.connect()?;
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = client.run(&mut SwitchMonitor, token).await {
                error!("Monitor stopped: {}", e);
            }
        }))
    } else {
        None
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for CTRL+C: {}", e),
        }
        signal.cancel();
    });

    controller.run(server, shutdown.clone()).await?;
    shutdown.cancel();
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ControllerConfig> {
    let mut config = ControllerConfig::load(args.config.as_deref(), DEFAULT_ENV_PREFIX)
        .context("Failed to load configuration")?;

    if let Some(address) = &args.address {
        config.listen.host = address.clone();
    }
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(versions) = &args.versions {
        config.protocol.versions = versions.clone();
    }
    if args.no_rpc {
        config.bus.enable_rpc = false;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Logs what applications would see
struct SwitchMonitor;

#[async_trait]
impl EventHandler for SwitchMonitor {
    async fn on_ofp_message(
        &mut self,
        _commands: &AppCommands,
        dpid: Option<u64>,
        message: OfpMessage,
    ) -> AppResult<()> {
        info!(
            dpid = ?dpid,
            msg_type = %MsgType::name_of(message.msg_type()),
            xid = message.xid,
            "📡 Switch message"
        );
        Ok(())
    }

    async fn on_control_event(
        &mut self,
        commands: &AppCommands,
        name: &str,
        payload: Value,
    ) -> AppResult<()> {
        info!(event = name, %payload, "Controller event");
        if name == event_bus::control::SWITCH_CONNECTED {
            let switches = commands.list_switches().await?;
            info!("Connected switches: {:?}", switches);
        }
        Ok(())
    }
}
