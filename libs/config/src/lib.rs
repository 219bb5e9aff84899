//! # Controller Configuration
//!
//! Configuration loading and validation for the OpenFlow controller.
//!
//! ## Sources (lowest to highest precedence)
//!
//! 1. Built-in defaults (every field has one; no file is required)
//! 2. TOML file
//! 3. Environment variables, `OFCTL_<SECTION>__<FIELD>` (e.g. `OFCTL_LISTEN__PORT=6633`)
//! 4. CLI flags applied by the binary
//!
//! ## Usage
//!
//! ```rust,no_run
//! use controller_config::ControllerConfig;
//!
//! let config = ControllerConfig::load(None, "OFCTL").unwrap();
//! println!("listening on {}", config.listen_addr());
//! ```

pub mod controller_config;

pub use controller_config::{
    BusSettings, ConfigError, ControllerConfig, CorrelationSettings, HandshakeSettings,
    KeepaliveSettings, ListenSettings, ProtocolSettings, DEFAULT_ENV_PREFIX,
};
