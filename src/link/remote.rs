//! Remote command channel used by the session worker.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::address::RobotAddress;
use super::signal::PingReport;
use crate::error::RemoteError;

/// Longest uninterrupted sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An open command session on the robot.
pub trait RemoteShell: Send {
    fn host(&self) -> &str;
    fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput, RemoteError>;
    fn put(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError>;
    fn close(&mut self);
}

/// Opens [`RemoteShell`]s. Must report `Timeout`, `Unreachable` and `Auth`
/// failures with the matching [`RemoteError`] variant.
///
/// A call in flight when `cancel` fires should stop early with
/// [`RemoteError::Cancelled`]; so should the shell's own calls.
pub trait RemoteConnector: Send + Sync {
    fn open(
        &self,
        address: &RobotAddress,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Box<dyn RemoteShell>, RemoteError>;
}

pub trait Pinger: Send + Sync {
    fn ping(&self, host: &str) -> PingReport;
}

/// Shared cancellation flag for the session worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns false when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
