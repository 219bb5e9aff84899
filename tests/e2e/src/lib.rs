//! End-to-end harness for the OpenFlow controller
//!
//! Runs a real [`controller::Controller`] on an ephemeral port and drives it
//! with simulated switches speaking OpenFlow over TCP, while applications
//! observe through the in-process bus.

pub mod fixtures;
pub mod framework;

pub use fixtures::{SimulatedSwitch, SwitchBehavior};
pub use framework::TestController;
