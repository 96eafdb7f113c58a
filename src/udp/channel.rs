//! Adaptive control/telemetry transport.
//!
//! Sends go out from the event loop; a reader thread blocks on the socket
//! and hands datagrams back through a crossbeam channel, so every state
//! change still happens on the loop thread.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::frame::{HELLO_PROBE, decode_response, encode_control};
use super::pacing::{Pacer, Watchdog};
use crate::error::{Error, Result};
use crate::events::StationEvent;
use crate::input::{DriverStationState, InputSample};
use crate::robot::{ProgramStatus, RobotMode, RobotState};
use crate::settings::RefreshRates;
use crate::telemetry::{SNAPSHOT_MARKER, TelemetryStore};

/// Send interval averaging period.
pub const AVG_DT_PERIOD: Duration = Duration::from_millis(500);

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_DATAGRAM_SIZE: usize = 2048;

struct Reader {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    rx: Receiver<Vec<u8>>,
}

impl Reader {
    fn spawn(socket: UdpSocket, robot_ip: IpAddr) -> Result<Self> {
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = unbounded();
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("udp-reader".to_string())
            .spawn(move || read_loop(socket, robot_ip, flag, tx))?;
        Ok(Reader {
            running,
            thread: Some(thread),
            rx,
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("UDP reader panicked");
            }
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(socket: UdpSocket, robot_ip: IpAddr, running: Arc<AtomicBool>, tx: Sender<Vec<u8>>) {
    log::info!("UDP reader started");
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buffer) {
            Ok(result) => result,
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            // ICMP port unreachable from a robot without a running program
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
            Err(e) => {
                log::error!("UDP recv error: {}", e);
                thread::sleep(READ_TIMEOUT);
                continue;
            }
        };
        if src.ip() != robot_ip {
            log::debug!("Ignoring datagram from {}", src);
            continue;
        }
        if tx.send(buffer[..len].to_vec()).is_err() {
            break;
        }
    }
    log::info!("UDP reader stopped");
}

pub struct UdpChannel {
    socket: UdpSocket,
    port: u16,
    host: String,
    target: Option<SocketAddr>,
    reader: Option<Reader>,
    rates: RefreshRates,
    pacer: Pacer,
    watchdog: Watchdog,
    last_sent: Option<DriverStationState>,
    request_full: bool,
    sent_count: u32,
    avg_window_start: Option<Instant>,
    avg_dt_ms: f32,
    events: Vec<StationEvent>,
}

impl UdpChannel {
    /// Open a socket on an ephemeral local port; frames go to `port` on the robot.
    pub fn new(port: u16, rates: RefreshRates) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        log::info!("UDP socket bound to {}", socket.local_addr()?);
        Ok(UdpChannel {
            socket,
            port,
            host: String::new(),
            target: None,
            reader: None,
            rates,
            pacer: Pacer::new(rates.idle),
            watchdog: Watchdog::default(),
            last_sent: None,
            request_full: true,
            sent_count: 0,
            avg_window_start: None,
            avg_dt_ms: 0.0,
            events: Vec::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn avg_interval_ms(&self) -> f32 {
        self.avg_dt_ms
    }

    pub fn request_full_telemetry(&self) -> bool {
        self.request_full
    }

    pub fn set_refresh_rates(&mut self, rates: RefreshRates) {
        self.rates = rates;
    }

    /// Start talking to `host` and listening for its responses.
    pub fn start(&mut self, host: &str) -> Result<()> {
        self.stop();
        let target = (host, self.port)
            .to_socket_addrs()
            .map_err(|source| Error::UdpSend {
                host: host.to_string(),
                source,
            })?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| Error::UdpSend {
                host: host.to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "no IPv4 address"),
            })?;
        let robot_ip = if target.ip().is_loopback() {
            IpAddr::from([127, 0, 0, 1])
        } else {
            target.ip()
        };
        self.reader = Some(Reader::spawn(self.socket.try_clone()?, robot_ip)?);
        self.host = host.to_string();
        self.target = Some(target);
        log::info!("UDP link to {} started", target);
        Ok(())
    }

    /// Stop sending and stop the reader.
    pub fn stop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
        if self.target.take().is_some() {
            log::info!("UDP link to {} stopped", self.host);
        }
        self.host.clear();
        self.pacer.reset();
        self.watchdog.disarm();
        self.last_sent = None;
        self.request_full = true;
        self.sent_count = 0;
        self.avg_window_start = None;
        self.set_avg_dt(0.0);
    }

    /// Apply every datagram received since the last call.
    pub fn poll_received(&mut self, now: Instant, robot: &mut RobotState, telemetry: &mut TelemetryStore) {
        let datagrams: Vec<Vec<u8>> = match &self.reader {
            Some(reader) => reader.rx.try_iter().collect(),
            None => return,
        };
        for datagram in datagrams {
            self.handle_response(&datagram, now, robot, telemetry);
        }
    }

    pub fn handle_response(
        &mut self,
        datagram: &[u8],
        now: Instant,
        robot: &mut RobotState,
        telemetry: &mut TelemetryStore,
    ) {
        self.watchdog.disarm();
        let Some(response) = decode_response(datagram) else {
            log::debug!("Short UDP response ({} bytes)", datagram.len());
            return;
        };

        if response.starting {
            if robot.program_status() == ProgramStatus::Running {
                log::info!("Robot program restarting, dropping its telemetry schema");
                telemetry.clear_session();
                self.request_full = true;
            }
            robot.set_program_status(ProgramStatus::Starting, now);
            return;
        }
        if robot.program_status() != ProgramStatus::Running {
            if let Some(mode) = response.mode {
                robot.adopt_mode(mode);
            }
            robot.set_program_status(ProgramStatus::Running, now);
        }

        telemetry.push_frame_stats(now, response.skipped_frames, response.frame_time);
        match telemetry.apply_udp_payload(response.telemetry) {
            Ok(()) => {
                if response.telemetry.first() == Some(&SNAPSHOT_MARKER) {
                    self.request_full = false;
                }
            }
            Err(e) => {
                log::warn!("Telemetry decode failed, requesting full snapshot: {}", e);
                self.request_full = true;
            }
        }
    }

    /// Watchdog, pacing and send. An error means the link is unusable.
    pub fn tick(
        &mut self,
        now: Instant,
        robot: &mut RobotState,
        telemetry: &mut TelemetryStore,
        pilots: [InputSample; 2],
    ) -> Result<()> {
        let Some(target) = self.target else {
            return Ok(());
        };

        if self.watchdog.expired(now) {
            log::warn!("No response from the robot program, assuming it stopped");
            robot.set_program_status(ProgramStatus::Idle, now);
            telemetry.clear_session();
            self.request_full = true;
        }

        self.pacer
            .set_limits(self.rates.for_state(robot.status(), robot.mode()));

        if robot.program_status() == ProgramStatus::Idle {
            if self.pacer.is_due(now, false) {
                self.send(target, &[HELLO_PROBE], now)?;
                self.last_sent = None;
            }
        } else {
            let state = DriverStationState::new(pilots, robot.enabled(), robot.mode());
            let changed = telemetry.has_pending_edits()
                || self.last_sent.is_none_or(|last| !last.is_same(&state));
            if self.pacer.is_due(now, changed) {
                let update = telemetry.generate_telemetry_update();
                let frame = encode_control(&state, self.request_full, &update);
                self.send(target, &frame, now)?;
                self.last_sent = Some(state);
            }
        }

        self.refresh_avg_dt(now);
        Ok(())
    }

    /// Send one frame with both pilots neutral and the robot disabled.
    pub fn send_neutral(&mut self, mode: RobotMode, now: Instant) -> Result<()> {
        let Some(target) = self.target else {
            return Ok(());
        };
        let frame = encode_control(&DriverStationState::neutral(mode), false, &[]);
        self.send(target, &frame, now)
    }

    pub fn take_events(&mut self) -> Vec<StationEvent> {
        std::mem::take(&mut self.events)
    }

    fn send(&mut self, target: SocketAddr, frame: &[u8], now: Instant) -> Result<()> {
        self.socket
            .send_to(frame, target)
            .map_err(|source| Error::UdpSend {
                host: self.host.clone(),
                source,
            })?;
        log::trace!("UDP sent {} bytes", frame.len());
        self.pacer.mark_sent(now);
        self.watchdog.arm(now);
        self.sent_count += 1;
        Ok(())
    }

    fn refresh_avg_dt(&mut self, now: Instant) {
        let start = *self.avg_window_start.get_or_insert(now);
        let window = now.saturating_duration_since(start);
        if window < AVG_DT_PERIOD {
            return;
        }
        let avg = if self.sent_count == 0 {
            0.0
        } else {
            window.as_secs_f32() * 1000.0 / self.sent_count as f32
        };
        self.sent_count = 0;
        self.avg_window_start = Some(now);
        self.set_avg_dt(avg);
    }

    fn set_avg_dt(&mut self, avg: f32) {
        if self.avg_dt_ms != avg {
            self.avg_dt_ms = avg;
            self.events.push(StationEvent::UdpAvgIntervalChanged(avg));
        }
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
