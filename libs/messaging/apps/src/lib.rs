//! # Applications
//!
//! ## Purpose
//!
//! Building blocks for processes that react to switch events and command
//! switches through the controller:
//!
//! - [`AppRegistry`]: explicit registry of unique application names
//! - [`AppClient`]: named bus client, event decoding and RPC commands
//! - [`EventHandler`]: callback trait driven by [`AppClient::run`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use apps::{AppClient, AppRegistry};
//! use event_bus::{EventBus, LocalBus};
//! use std::sync::Arc;
//!
//! # async fn demo() -> apps::AppResult<()> {
//! let bus: Arc<dyn EventBus> = Arc::new(LocalBus::default());
//! let registry = AppRegistry::new();
//! let mut app = AppClient::new("monitor", bus, &registry)?;
//! app.connect()?;
//! while let Some(event) = app.next_event().await? {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod registry;

pub use client::{AppClient, AppCommands, AppEvent};
pub use error::{AppError, AppResult};
pub use handler::EventHandler;
pub use registry::AppRegistry;
