//! Controller under test

use anyhow::{anyhow, Result};
use apps::{AppClient, AppEvent, AppRegistry};
use controller::{ConnectionManager, Controller};
use controller_config::ControllerConfig;
use event_bus::{EventBus, LocalBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default wait for anything the controller should do promptly
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running controller bound to an ephemeral loopback port
pub struct TestController {
    addr: SocketAddr,
    bus: LocalBus,
    manager: ConnectionManager,
    registry: AppRegistry,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<controller::ControllerResult<()>>>,
}

impl TestController {
    /// Config with the listener on an ephemeral port and keepalive out of the way
    pub fn config() -> ControllerConfig {
        let mut config = ControllerConfig::default();
        config.listen.host = "127.0.0.1".to_string();
        config.listen.port = 0;
        config.keepalive.interval_ms = 60_000;
        config
    }

    pub async fn start() -> Result<Self> {
        Self::start_with(Self::config()).await
    }

    pub async fn start_with(config: ControllerConfig) -> Result<Self> {
        let bus = LocalBus::default();
        let shared: Arc<dyn EventBus> = Arc::new(bus.clone());
        let controller = Controller::new(config, shared)?;
        let server = controller.bind().await?;
        let addr = server.local_addr()?;
        let manager = controller.manager().clone();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { controller.run(server, token).await });

        let harness = Self {
            addr,
            bus,
            manager,
            registry: AppRegistry::new(),
            shutdown,
            handle: Some(handle),
        };
        harness.wait_ready().await?;
        info!(addr = %addr, "Test controller running");
        Ok(harness)
    }

    // RPC methods are registered once run() is past startup
    async fn wait_ready(&self) -> Result<()> {
        wait_until(STEP_TIMEOUT, || !self.bus.methods().is_empty()).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// A connected application named `name`
    pub fn app(&self, name: &str) -> Result<AppClient> {
        let mut client = AppClient::new(name, Arc::new(self.bus.clone()), &self.registry)?;
        client.connect()?;
        Ok(client)
    }

    /// Block until `dpid` is listed as a connected switch
    pub async fn wait_for_switch(&self, dpid: u64) -> Result<()> {
        wait_until(STEP_TIMEOUT, || self.manager.list_switches().contains(&dpid)).await
    }

    pub async fn stop(mut self) -> Result<()> {
        self.shutdown.cancel();
        match self.handle.take() {
            Some(handle) => Ok(handle.await??),
            None => Ok(()),
        }
    }
}

impl Drop for TestController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Poll `condition` every few milliseconds until it holds
pub async fn wait_until(within: Duration, mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + within;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("condition not met within {:?}", within));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// Next application event matching `pick`, skipping the rest
pub async fn next_matching<T>(
    client: &mut AppClient,
    within: Duration,
    mut pick: impl FnMut(AppEvent) -> Option<T>,
) -> Result<T> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, client.next_event())
            .await
            .map_err(|_| anyhow!("no matching event within {:?}", within))??
            .ok_or_else(|| anyhow!("subscription closed"))?;
        if let Some(found) = pick(event) {
            return Ok(found);
        }
    }
}
