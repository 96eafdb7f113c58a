//! Command-channel side of the robot link: address parsing, link quality,
//! and the background session that claims and supervises the robot.

pub mod address;
pub mod remote;
pub mod session;
pub mod signal;
pub mod ssh;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use address::RobotAddress;
pub use remote::{CancelToken, CommandOutput, Pinger, RemoteConnector, RemoteShell};
pub use session::{SessionConfig, SessionContext, SessionEvent, SessionHandle, SessionMessage};
pub use signal::{PingReport, signal_strength};

/// Address that skips the command channel and talks UDP to this machine.
pub const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Pinging,
    Authenticating,
    CheckAvailable,
    WaitAvailable,
    Setup,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Pinging => "Pinging",
            ConnectionStatus::Authenticating => "Authenticating",
            ConnectionStatus::CheckAvailable => "Check Available",
            ConnectionStatus::WaitAvailable => "Wait Available",
            ConnectionStatus::Setup => "Setup",
            ConnectionStatus::Connected => "Connected",
        };
        f.write_str(name)
    }
}
