//! Background session with a robot host.
//!
//! One worker thread per connection attempt walks the handshake
//!
//! ```text
//! PINGING → AUTHENTICATING → CHECK_AVAILABLE → [WAIT_AVAILABLE →] SETUP → CONNECTED
//! ```
//!
//! then supervises the link (ping, status poll) until it is lost or
//! cancelled. The worker never touches station state: everything it learns
//! goes back to the event loop as [`SessionMessage`]s tagged with the
//! generation of the attempt, so messages of an abandoned attempt can be
//! told apart from the current one.
//!
//! # Lock protocol
//!
//! The robot holds a marker file with the hostname of the station driving
//! it. A station refreshes the marker on every status poll. A marker younger
//! than `lock_max_age` may belong to a live station: the worker waits that
//! long and re-reads it. A changed, non-empty marker means someone else is
//! in control and the attempt fails with [`FailureReason::Locked`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use super::ConnectionStatus;
use super::address::RobotAddress;
use super::remote::{CancelToken, CommandOutput, Pinger, RemoteConnector, RemoteShell};
use super::signal::signal_strength;
use crate::error::{FailureReason, RemoteError};

const DEFAULT_HOSTNAME: &str = "driver-station";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Age under which a lock marker may belong to a live station.
    pub lock_max_age: Duration,
    pub command_timeout: Duration,
    pub poll_timeout: Duration,
    pub connect_timeout: Duration,
    /// Pause between supervision steps.
    pub supervise_pause: Duration,
    /// Consecutive status poll timeouts tolerated before the link is lost.
    pub max_poll_timeouts: u32,
    /// Name written into the lock marker.
    pub hostname: String,
    /// Companion script pushed to the robot.
    pub script_path: PathBuf,
    pub remote_lock_path: String,
    pub remote_script_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            lock_max_age: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            supervise_pause: Duration::from_secs(1),
            max_poll_timeouts: 3,
            hostname: local_hostname(),
            script_path: PathBuf::from("DS.sh"),
            remote_lock_path: "robot.lock".to_string(),
            remote_script_path: "DS.sh".to_string(),
        }
    }
}

/// Best guess at this machine's name.
pub fn local_hostname() -> String {
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    Signal { strength: u8, ping_ms: f32 },
    Connected { host: String },
    Failed { reason: FailureReason, message: String },
    /// Raw output of the companion script.
    StatusReport(String),
    Lost { reason: String },
    /// The worker has released the robot and exited.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub generation: u64,
    pub event: SessionEvent,
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub connector: Arc<dyn RemoteConnector>,
    pub pinger: Arc<dyn Pinger>,
    pub config: Arc<SessionConfig>,
}

/// Owner side of a running session worker.
pub struct SessionHandle {
    generation: u64,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn spawn(
        address: RobotAddress,
        generation: u64,
        context: SessionContext,
        tx: Sender<SessionMessage>,
    ) -> Self {
        let cancel = CancelToken::new();
        let worker = Worker {
            address,
            generation,
            context,
            cancel: cancel.clone(),
            tx,
            claimed: false,
        };
        let thread = thread::Builder::new()
            .name(format!("session-{}", generation))
            .spawn(move || worker.run());
        let thread = match thread {
            Ok(t) => Some(t),
            Err(e) => {
                log::error!("Failed to spawn session worker: {}", e);
                None
            }
        };
        SessionHandle {
            generation,
            cancel,
            thread,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Ask the worker to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the worker and wait for it to release the robot.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Session worker {} panicked", self.generation);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Abort {
    Cancelled,
    Failed(FailureReason, String),
}

type Step<T> = std::result::Result<T, Abort>;

struct Worker {
    address: RobotAddress,
    generation: u64,
    context: SessionContext,
    cancel: CancelToken,
    tx: Sender<SessionMessage>,
    claimed: bool,
}

impl Worker {
    fn run(mut self) {
        log::info!("Session {} started for {}", self.generation, self.address);
        match self.connect() {
            Ok(mut shell) => {
                if let Some(reason) = self.supervise(shell.as_mut()) {
                    log::warn!("Connection with {} lost: {}", self.address.host, reason);
                    self.send(SessionEvent::Lost { reason });
                }
                self.release(shell.as_mut());
            }
            Err(Abort::Cancelled) => log::info!("Session {} cancelled", self.generation),
            Err(Abort::Failed(reason, message)) => {
                log::warn!("Connection to {} failed ({}): {}", self.address.host, reason, message);
                self.send(SessionEvent::Failed { reason, message });
            }
        }
        self.send(SessionEvent::Finished);
    }

    fn send(&self, event: SessionEvent) {
        let message = SessionMessage {
            generation: self.generation,
            event,
        };
        if self.tx.send(message).is_err() {
            log::debug!("Session {} has no listener", self.generation);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        log::info!("Connection status: {}", status);
        self.send(SessionEvent::Status(status));
    }

    fn checkpoint(&self) -> Step<()> {
        if self.cancel.is_cancelled() {
            Err(Abort::Cancelled)
        } else {
            Ok(())
        }
    }

    fn pause(&self, duration: Duration) -> Step<()> {
        if self.cancel.sleep(duration) {
            Ok(())
        } else {
            Err(Abort::Cancelled)
        }
    }

    /// Ping the host and publish the signal strength.
    fn refresh_signal(&self) -> u8 {
        let report = self.context.pinger.ping(&self.address.host);
        let strength = signal_strength(&report);
        self.send(SessionEvent::Signal {
            strength,
            ping_ms: report.avg_rtt_ms,
        });
        strength
    }

    fn connect(&mut self) -> Step<Box<dyn RemoteShell>> {
        self.set_status(ConnectionStatus::Pinging);
        self.checkpoint()?;
        if self.refresh_signal() == 0 {
            return Err(Abort::Failed(
                FailureReason::Unreachable,
                format!("Robot at {} does not answer to ping.", self.address.host),
            ));
        }

        self.checkpoint()?;
        self.set_status(ConnectionStatus::Authenticating);
        let mut shell = self.open_shell()?;
        if let Err(abort) = self.checkpoint() {
            shell.close();
            return Err(abort);
        }

        match self.prepare(shell.as_mut()) {
            Ok(()) => {
                self.set_status(ConnectionStatus::Connected);
                self.send(SessionEvent::Connected {
                    host: self.address.host.clone(),
                });
                Ok(shell)
            }
            Err(abort) => {
                self.release(shell.as_mut());
                Err(abort)
            }
        }
    }

    fn open_shell(&self) -> Step<Box<dyn RemoteShell>> {
        let config = &self.context.config;
        let address = &self.address;
        self.context
            .connector
            .open(address, config.connect_timeout, &self.cancel)
            .map_err(|e| match e {
                RemoteError::Cancelled => Abort::Cancelled,
                RemoteError::Timeout => Abort::Failed(
                    FailureReason::Unreachable,
                    format!("Invalid robot address: {} (or robot is too busy).", address.host),
                ),
                RemoteError::Unreachable(_) => Abort::Failed(
                    FailureReason::Unreachable,
                    format!("Invalid robot address: {}:{}.", address.host, address.port),
                ),
                RemoteError::Auth(_) => Abort::Failed(
                    FailureReason::Authentication,
                    format!(
                        "Impossible to login to the robot with username \"{}\" and password \"{}\".",
                        address.user, address.password
                    ),
                ),
                other => {
                    log::error!("Error when connecting to {}: {}", address, other);
                    Abort::Failed(
                        FailureReason::Runtime,
                        format!("Error when connecting to the robot at {}. See the log for details.", address),
                    )
                }
            })
    }

    /// Lock check, lock claim and script deployment.
    fn prepare(&mut self, shell: &mut dyn RemoteShell) -> Step<()> {
        let config = Arc::clone(&self.context.config);

        self.set_status(ConnectionStatus::CheckAvailable);
        let lock_date = self.lock_date(shell)?;
        self.checkpoint()?;
        let robot_date = self.robot_date(shell)?;

        if robot_date - lock_date <= config.lock_max_age.as_secs_f64() {
            self.set_status(ConnectionStatus::WaitAvailable);
            self.pause(config.lock_max_age)?;
            let new_lock_date = self.lock_date(shell)?;
            if new_lock_date != lock_date && new_lock_date != 0.0 {
                let holder = self.run_remote(shell, &format!("cat {}", config.remote_lock_path))?;
                let holder = holder.stdout.trim();
                let holder = if holder.is_empty() {
                    "an unknown device".to_string()
                } else if holder == config.hostname {
                    "this computer. Another driver station is probably already running".to_string()
                } else {
                    holder.to_string()
                };
                return Err(Abort::Failed(
                    FailureReason::Locked,
                    format!("The robot is already used by {}.", holder),
                ));
            }
        }

        self.checkpoint()?;
        self.run_remote(
            shell,
            &format!("echo \"{}\" > {}", config.hostname, config.remote_lock_path),
        )?;
        self.claimed = true;

        self.checkpoint()?;
        self.set_status(ConnectionStatus::Setup);
        self.push_script(shell)?;
        let status = self.run_remote(shell, &format!("chmod +x {}", config.remote_script_path))?;
        if !status.stderr.trim().is_empty() {
            return Err(Abort::Failed(
                FailureReason::Setup,
                "Impossible to make the driver station script executable on the robot.".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload the companion script with Unix line endings.
    fn push_script(&self, shell: &mut dyn RemoteShell) -> Step<()> {
        let config = &self.context.config;
        let setup_failed = |what: String| Abort::Failed(FailureReason::Setup, what);

        let script = fs::read_to_string(&config.script_path).map_err(|e| {
            setup_failed(format!(
                "Cannot read driver station script {}: {}",
                config.script_path.display(),
                e
            ))
        })?;
        let script = script.replace("\r\n", "\n");
        let staged = std::env::temp_dir().join(format!("driver-station-{}-DS.sh", self.generation));
        fs::write(&staged, script)
            .map_err(|e| setup_failed(format!("Cannot stage driver station script: {}", e)))?;

        let pushed = shell.put(&staged, &config.remote_script_path);
        if let Err(e) = fs::remove_file(&staged) {
            log::debug!("Cannot remove staged script {}: {}", staged.display(), e);
        }
        pushed.map_err(|e| match e {
            RemoteError::Cancelled => Abort::Cancelled,
            e => setup_failed(format!("Impossible to push the driver station script: {}", e)),
        })
    }

    /// Modification time of the lock marker in robot seconds, 0 when absent.
    fn lock_date(&self, shell: &mut dyn RemoteShell) -> Step<f64> {
        let config = &self.context.config;
        let output = self.run_remote(shell, &format!("stat -c %Y {}", config.remote_lock_path))?;
        if !output.success() {
            return Ok(0.0);
        }
        Ok(output.stdout.trim().parse::<f64>().unwrap_or(0.0))
    }

    fn robot_date(&self, shell: &mut dyn RemoteShell) -> Step<f64> {
        let output = self.run_remote(shell, "date +%s")?;
        output.stdout.trim().parse::<f64>().map_err(|_| {
            Abort::Failed(
                FailureReason::Runtime,
                format!("Unexpected robot date: {:?}", output.stdout.trim()),
            )
        })
    }

    fn run_remote(&self, shell: &mut dyn RemoteShell, command: &str) -> Step<CommandOutput> {
        log::debug!("[{}] $ {}", self.address.host, command);
        shell
            .run(command, self.context.config.command_timeout)
            .map_err(|e| match e {
                RemoteError::Cancelled => Abort::Cancelled,
                e => {
                    log::error!("Remote command '{}' failed: {}", command, e);
                    Abort::Failed(FailureReason::Runtime, e.to_string())
                }
            })
    }

    /// Ping, pause, status poll, pause. Returns the reason the link was
    /// lost, or `None` when cancelled.
    fn supervise(&self, shell: &mut dyn RemoteShell) -> Option<String> {
        let config = &self.context.config;
        let poll_command = format!("touch {}; ./{}", config.remote_lock_path, config.remote_script_path);
        let mut poll_timeouts = 0;

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if self.refresh_signal() == 0 {
                return Some("Robot didn't respond to ping in time.".to_string());
            }
            if !self.cancel.sleep(config.supervise_pause) {
                return None;
            }

            match shell.run(&poll_command, config.poll_timeout) {
                Ok(output) if !output.stderr.trim().is_empty() => {
                    log::error!("Driver station script error:\n{}", output.stderr);
                    return Some("Driver station script returned an error.".to_string());
                }
                Ok(output) => {
                    poll_timeouts = 0;
                    self.send(SessionEvent::StatusReport(output.stdout));
                }
                Err(RemoteError::Cancelled) => return None,
                Err(RemoteError::Timeout) => {
                    poll_timeouts += 1;
                    log::warn!(
                        "Status poll timed out ({}/{})",
                        poll_timeouts,
                        config.max_poll_timeouts
                    );
                    if poll_timeouts >= config.max_poll_timeouts {
                        return Some(format!(
                            "Robot status poll timed out {} times in a row.",
                            poll_timeouts
                        ));
                    }
                }
                Err(e) => {
                    log::error!("Status poll failed: {}", e);
                    return Some("Connection with the robot has been lost.".to_string());
                }
            }

            if !self.cancel.sleep(config.supervise_pause) {
                return None;
            }
        }
    }

    /// Best effort: drop our lock marker and close the channel.
    fn release(&mut self, shell: &mut dyn RemoteShell) {
        if self.claimed {
            let command = format!("rm -f {}", self.context.config.remote_lock_path);
            if let Err(e) = shell.run(&command, self.context.config.command_timeout) {
                log::warn!("Failed to release robot lock: {}", e);
            }
            self.claimed = false;
        }
        shell.close();
        log::info!("Session {} closed", self.generation);
    }
}
