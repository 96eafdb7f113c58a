//! End-to-end run against a robot program simulated on a loopback socket.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use driver_station::error::RemoteError;
use driver_station::input::{Key, NoDevices};
use driver_station::link::{
    CancelToken, ConnectionStatus, PingReport, Pinger, RemoteConnector, RemoteShell, RobotAddress, SessionConfig, SessionContext,
};
use driver_station::robot::{ProgramStatus, RobotMode, RobotStatus};
use driver_station::settings::MemorySettings;
use driver_station::telemetry::{SNAPSHOT_MARKER, TelemetryValue};
use driver_station::udp::HELLO_PROBE;
use driver_station::{DriverStation, StationConfig, StationEvent};

struct NoPing;

impl Pinger for NoPing {
    fn ping(&self, _host: &str) -> PingReport {
        PingReport::unreachable()
    }
}

struct NoSsh;

impl RemoteConnector for NoSsh {
    fn open(
        &self,
        _address: &RobotAddress,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<Box<dyn RemoteShell>, RemoteError> {
        Err(RemoteError::Unreachable("no ssh in tests".to_string()))
    }
}

struct Harness {
    station: DriverStation,
    robot: UdpSocket,
    station_addr: Option<SocketAddr>,
    events: Vec<StationEvent>,
}

impl Harness {
    fn new() -> Self {
        let robot = UdpSocket::bind("127.0.0.1:0").unwrap();
        robot.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let context = SessionContext {
            connector: Arc::new(NoSsh),
            pinger: Arc::new(NoPing),
            config: Arc::new(SessionConfig::default()),
        };
        let config = StationConfig {
            robot_port: robot.local_addr().unwrap().port(),
            ..StationConfig::default()
        };
        let station =
            DriverStation::new(Box::new(MemorySettings::new()), Box::new(NoDevices), context, config).unwrap();
        Harness {
            station,
            robot,
            station_addr: None,
            events: Vec::new(),
        }
    }

    /// Tick the station until the robot receives a datagram matching `pred`.
    fn expect_datagram(&mut self, pred: impl Fn(&[u8]) -> bool) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut buf = [0u8; 512];
        while Instant::now() < deadline {
            let events = self.station.tick(Instant::now());
            self.events.extend(events);
            if let Ok((len, src)) = self.robot.recv_from(&mut buf) {
                self.station_addr = Some(src);
                if pred(&buf[..len]) {
                    return buf[..len].to_vec();
                }
            }
        }
        panic!("robot never received the expected datagram");
    }

    fn reply(&self, datagram: &[u8]) {
        let to = self.station_addr.expect("station address unknown");
        self.robot.send_to(datagram, to).unwrap();
    }

    fn tick_until(&mut self, pred: impl Fn(&DriverStation) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !pred(&self.station) {
            assert!(Instant::now() < deadline, "station never reached the expected state");
            let events = self.station.tick(Instant::now());
            self.events.extend(events);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 512];
        while self.robot.recv_from(&mut buf).is_ok() {}
    }

    fn start_program(&mut self) {
        self.station.connect("localhost");
        assert_eq!(self.station.connection_status(), ConnectionStatus::Connected);
        self.expect_datagram(|d| d == [HELLO_PROBE]);

        let mut snapshot = vec![0x00, 0, 5, SNAPSHOT_MARKER];
        snapshot.extend_from_slice(b"?speed: 1.5\nname: bot\n");
        self.reply(&snapshot);
        self.tick_until(|s| s.robot().program_status() == ProgramStatus::Running);
    }
}

#[test]
fn test_program_discovery_and_control() {
    let mut h = Harness::new();
    h.start_program();

    assert_eq!(h.station.robot().status(), RobotStatus::Disabled);
    assert_eq!(h.station.robot().mode(), RobotMode::Teleoperated);
    assert_eq!(h.station.telemetry().variables().len(), 2);
    assert!(h.events.contains(&StationEvent::ConnectionSucceeded("localhost".to_string())));
    assert!(h.events.contains(&StationEvent::ProgramStarted));

    // Disabled frames, snapshot no longer requested
    let frame = h.expect_datagram(|d| d.len() >= 21);
    assert_eq!(frame[0], 0x00);

    h.station.set_enabled(true, Instant::now());
    h.station.key_event(Key::W, true, Instant::now());
    let frame = h.expect_datagram(|d| d.len() >= 21 && d[0] == 0x02);
    assert_eq!(frame[2] as i8, -125);

    h.station
        .set_variable(0, TelemetryValue::Float(2.0))
        .unwrap();
    let frame = h.expect_datagram(|d| d.len() > 21);
    assert_eq!(frame[21], 0);
    assert_eq!(&frame[22..26], &2.0f32.to_le_bytes());

    h.station.disconnect();
    assert_eq!(h.station.connection_status(), ConnectionStatus::Disconnected);
    assert_eq!(h.station.robot().program_status(), ProgramStatus::Idle);
    assert!(h.station.telemetry().variables().is_empty());
}

#[test]
fn test_robot_reported_mode_is_adopted() {
    let mut h = Harness::new();
    h.station.connect("localhost");
    h.expect_datagram(|d| d == [HELLO_PROBE]);
    h.reply(&[0x01, 0, 0]);
    h.tick_until(|s| s.robot().program_status() == ProgramStatus::Running);

    assert_eq!(h.station.robot().mode(), RobotMode::Autonomous);
    assert!(!h.station.robot().enabled());
}

#[test]
fn test_shutdown_sends_neutral_frame() {
    let mut h = Harness::new();
    h.start_program();
    h.station.set_enabled(true, Instant::now());
    h.station.key_event(Key::D, true, Instant::now());
    h.expect_datagram(|d| d.len() >= 21 && d[0] == 0x02);
    h.drain();

    h.station.shutdown(Instant::now());
    let mut buf = [0u8; 512];
    let (len, _) = h.robot.recv_from(&mut buf).unwrap();
    assert_eq!(len, 21);
    assert_eq!(buf[0], 0x00);
    assert_eq!(buf[1], 0);
    assert_eq!(h.station.connection_status(), ConnectionStatus::Disconnected);
}
