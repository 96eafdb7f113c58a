//! Driver station for small educational robots.
//!
//! The station reaches a robot over an SSH command channel, claims it with
//! a lock marker, launches the robot program and then streams controller
//! state over UDP while reading telemetry back.

pub mod bridge;
pub mod error;
pub mod events;
pub mod input;
pub mod link;
pub mod robot;
pub mod settings;
pub mod station;
pub mod telemetry;
pub mod udp;

pub use error::{Error, Result};
pub use events::{EventBus, StationEvent};
pub use station::{DriverStation, StationConfig, StationSnapshot};
