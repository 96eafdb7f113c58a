//! UDP side of the robot link.

pub mod channel;
pub mod frame;
pub mod pacing;

pub use channel::UdpChannel;
pub use frame::{HELLO_PROBE, ROBOT_PORT, ResponseFrame, decode_response, encode_control};
pub use pacing::{Pacer, WATCHDOG_TIMEOUT, Watchdog};
