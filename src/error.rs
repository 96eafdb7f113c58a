//! Error types for the driver station

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Driver station error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (sockets, settings file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UDP send to the robot failed (bad address, socket closed)
    #[error("Impossible to send UDP message to {host}: {source}")]
    UdpSend {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Robot address not of the form `[user[:password]@]host[:port]`
    #[error("Invalid robot address: {0}")]
    InvalidAddress(String),
}

/// Telemetry decode failures. Recoverable: the caller asks for a full snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("variable index {index} out of range ({len} known)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("truncated value for variable {index}")]
    Truncated { index: usize },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("type mismatch for variable {0}")]
    TypeMismatch(usize),

    #[error("variable {0} is read-only")]
    NotEditable(usize),
}

/// Why a connection attempt was refused or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Unreachable,
    Authentication,
    Locked,
    Setup,
    Runtime,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::Unreachable => "Unreachable",
            FailureReason::Authentication => "Authentication",
            FailureReason::Locked => "Locked",
            FailureReason::Setup => "Setup",
            FailureReason::Runtime => "Runtime",
        };
        f.write_str(name)
    }
}

/// Errors reported by the remote command channel collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote command timed out")]
    Timeout,

    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("authentication refused: {0}")]
    Auth(String),

    #[error("remote command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("remote command cancelled")]
    Cancelled,
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        RemoteError::Io(e.to_string())
    }
}
