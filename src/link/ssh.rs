//! Remote command channel backed by the system `ssh`, `scp` and `ping`
//! binaries. Password logins go through `sshpass`.
//!
//! All commands of one shell share a multiplexed master connection, so only
//! the first call pays for the handshake.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::address::RobotAddress;
use super::remote::{CancelToken, CommandOutput, Pinger, RemoteConnector, RemoteShell};
use super::signal::PingReport;
use crate::error::RemoteError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PING_COUNT: u32 = 3;
const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// `ssh` exit code for connection level failures.
const SSH_CONNECTION_ERROR: i32 = 255;
/// `sshpass` exit code for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl RemoteConnector for SshConnector {
    fn open(
        &self,
        address: &RobotAddress,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Box<dyn RemoteShell>, RemoteError> {
        let mut shell = SshShell::new(address.clone(), timeout, cancel.clone());
        log::info!("Opening SSH session to {}", address);
        let output = shell.run("true", timeout)?;
        if !output.success() {
            return Err(RemoteError::Command(output.stderr.trim().to_string()));
        }
        Ok(Box::new(shell))
    }
}

pub struct SshShell {
    address: RobotAddress,
    connect_timeout: Duration,
    control_path: PathBuf,
    cancel: CancelToken,
}

impl SshShell {
    fn new(address: RobotAddress, connect_timeout: Duration, cancel: CancelToken) -> Self {
        let control_path = std::env::temp_dir().join(format!(
            "driver-station-{}-{}-{}",
            std::process::id(),
            address.host,
            address.port
        ));
        SshShell {
            address,
            connect_timeout,
            control_path,
            cancel,
        }
    }

    fn common_options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            "ControlPersist=60".to_string(),
        ];
        if self.address.password.is_empty() {
            options.push("-o".to_string());
            options.push("BatchMode=yes".to_string());
        }
        options
    }

    /// Wrap `program` in `sshpass` when the address carries a password.
    fn command(&self, program: &str) -> Command {
        if self.address.password.is_empty() {
            Command::new(program)
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.env("SSHPASS", &self.address.password).arg("-e").arg(program);
            cmd
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.address.user, self.address.host)
    }
}

impl RemoteShell for SshShell {
    fn host(&self) -> &str {
        &self.address.host
    }

    fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        let mut cmd = self.command("ssh");
        cmd.arg("-p")
            .arg(self.address.port.to_string())
            .args(self.common_options())
            .arg(self.target())
            .arg(command);
        let output = run_with_timeout(cmd, timeout, &self.cancel)?;
        classify_ssh_failure(&output)?;
        Ok(output)
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let mut cmd = self.command("scp");
        cmd.arg("-P")
            .arg(self.address.port.to_string())
            .args(self.common_options())
            .arg(local)
            .arg(format!("{}:{}", self.target(), remote));
        let output = run_with_timeout(cmd, self.connect_timeout, &self.cancel)?;
        classify_ssh_failure(&output)?;
        if !output.success() {
            return Err(RemoteError::Command(output.stderr.trim().to_string()));
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut cmd = Command::new("ssh");
        cmd.args(self.common_options())
            .arg("-O")
            .arg("exit")
            .arg(self.target());
        if let Err(e) = run_with_timeout(cmd, Duration::from_secs(2), &CancelToken::new()) {
            log::debug!("Closing SSH master for {} failed: {}", self.address.host, e);
        }
    }
}

impl Drop for SshShell {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.control_path);
    }
}

fn classify_ssh_failure(output: &CommandOutput) -> Result<(), RemoteError> {
    if output.exit_code == SSHPASS_BAD_PASSWORD {
        return Err(RemoteError::Auth("password rejected".to_string()));
    }
    if output.exit_code != SSH_CONNECTION_ERROR {
        return Ok(());
    }
    let stderr = output.stderr.trim().to_string();
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") {
        Err(RemoteError::Auth(stderr))
    } else if lower.contains("timed out") {
        Err(RemoteError::Timeout)
    } else if lower.contains("could not resolve")
        || lower.contains("no route")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
    {
        Err(RemoteError::Unreachable(stderr))
    } else {
        Err(RemoteError::Io(stderr))
    }
}

/// Run a process to completion or kill it once `timeout` expires.
///
/// A process started before `cancel` fired is killed when it fires. One
/// started afterwards (lock release during teardown) runs to its timeout.
fn run_with_timeout(mut cmd: Command, timeout: Duration, cancel: &CancelToken) -> Result<CommandOutput, RemoteError> {
    let cancellable = !cancel.is_cancelled();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = spawn_reader(&mut child, true);
    let stderr = spawn_reader(&mut child, false);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancellable && cancel.is_cancelled() {
            kill(&mut child);
            return Err(RemoteError::Cancelled);
        }
        if Instant::now() >= deadline {
            kill(&mut child);
            return Err(RemoteError::Timeout);
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        exit_code: status.code().unwrap_or(-1),
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("Cannot kill process {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        log::debug!("Cannot reap process {}: {}", child.id(), e);
    }
}

fn spawn_reader(child: &mut Child, stdout: bool) -> thread::JoinHandle<String> {
    let pipe: Option<Box<dyn Read + Send>> = if stdout {
        child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    } else {
        child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    };
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

/// Probes with the system `ping` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemPinger;

impl Pinger for SystemPinger {
    fn ping(&self, host: &str) -> PingReport {
        let mut cmd = Command::new("ping");
        cmd.arg("-c")
            .arg(PING_COUNT.to_string())
            .arg("-i")
            .arg("0.2")
            .arg("-W")
            .arg("1")
            .arg(host);
        match run_with_timeout(cmd, PING_TIMEOUT, &CancelToken::new()) {
            Ok(output) => parse_ping_output(&output.stdout),
            Err(e) => {
                log::warn!("ping {} failed: {}", host, e);
                PingReport::unreachable()
            }
        }
    }
}

/// Parse the summary lines of iputils / busybox `ping`.
pub fn parse_ping_output(text: &str) -> PingReport {
    let mut loss = None;
    let mut rtt = None;
    for line in text.lines() {
        if let Some(end) = line.find("% packet loss") {
            let start = line[..end].rfind(|c: char| c == ' ' || c == ',').map_or(0, |i| i + 1);
            loss = line[start..end].trim().parse::<f32>().ok();
        }
        // rtt min/avg/max/mdev = 0.045/0.052/0.060/0.006 ms
        if let Some((_, values)) = line.split_once(" = ") {
            let fields: Vec<f32> = values
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split('/')
                .filter_map(|v| v.parse().ok())
                .collect();
            if fields.len() >= 3 {
                rtt = Some((fields[1], fields[2]));
            }
        }
    }
    match (loss, rtt) {
        (Some(loss), Some((avg, max))) if loss < 100.0 => PingReport {
            alive: true,
            avg_rtt_ms: avg,
            max_rtt_ms: max,
            packet_loss: loss / 100.0,
        },
        _ => PingReport::unreachable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iputils_ping() {
        let text = "PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.\n\
64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=12.1 ms\n\
\n\
--- 10.0.0.2 ping statistics ---\n\
3 packets transmitted, 2 received, 33.3333% packet loss, time 402ms\n\
rtt min/avg/max/mdev = 10.100/12.100/14.100/2.000 ms\n";
        let report = parse_ping_output(text);
        assert!(report.alive);
        assert!((report.packet_loss - 0.333333).abs() < 1e-3);
        assert_eq!(report.avg_rtt_ms, 12.1);
        assert_eq!(report.max_rtt_ms, 14.1);
    }

    #[test]
    fn test_parse_busybox_ping() {
        let text = "3 packets transmitted, 3 packets received, 0% packet loss\n\
round-trip min/avg/max = 0.1/0.2/0.3 ms\n";
        let report = parse_ping_output(text);
        assert!(report.alive);
        assert_eq!(report.packet_loss, 0.0);
        assert_eq!(report.max_rtt_ms, 0.3);
    }

    #[test]
    fn test_parse_unreachable() {
        let text = "3 packets transmitted, 0 received, 100% packet loss, time 2030ms\n";
        assert!(!parse_ping_output(text).alive);
        assert!(!parse_ping_output("").alive);
    }

    #[test]
    fn test_password_not_in_arguments() {
        let address = RobotAddress::parse("pi:secret@robot").unwrap();
        let shell = SshShell::new(address, Duration::from_secs(1), CancelToken::new());
        let cmd = shell.command("ssh");
        assert_eq!(cmd.get_program(), "sshpass");
        assert!(cmd.get_args().all(|arg| arg != "secret"));
        assert!(
            cmd.get_envs()
                .any(|(key, value)| key == "SSHPASS" && value == Some("secret".as_ref()))
        );
    }

    #[test]
    fn test_cancel_kills_running_process() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        assert_eq!(
            run_with_timeout(cmd, Duration::from_secs(10), &cancel),
            Err(RemoteError::Cancelled)
        );
        assert!(started.elapsed() < Duration::from_secs(2));
        canceller.join().unwrap();

        // Commands started after the cancel still run, for the lock release
        let output = run_with_timeout(Command::new("true"), Duration::from_secs(5), &cancel).unwrap();
        assert!(output.success());
    }

    #[test]
    fn test_classify_failures() {
        let out = |code: i32, stderr: &str| CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: code,
        };
        assert!(classify_ssh_failure(&out(0, "")).is_ok());
        assert!(classify_ssh_failure(&out(1, "stat: cannot stat")).is_ok());
        assert!(matches!(
            classify_ssh_failure(&out(255, "robot@x: Permission denied (publickey,password).")),
            Err(RemoteError::Auth(_))
        ));
        assert_eq!(
            classify_ssh_failure(&out(255, "ssh: connect to host x port 22: Connection timed out")),
            Err(RemoteError::Timeout)
        );
        assert!(matches!(
            classify_ssh_failure(&out(255, "ssh: Could not resolve hostname x")),
            Err(RemoteError::Unreachable(_))
        ));
        assert!(matches!(classify_ssh_failure(&out(5, "")), Err(RemoteError::Auth(_))));
    }
}
