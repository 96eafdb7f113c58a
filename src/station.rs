//! The driver station: one object owning the robot state, the inputs, the
//! telemetry and both halves of the link, stepped by a single event loop.
//!
//! Background threads (session worker, UDP reader) only ever talk to it
//! through channels drained in [`DriverStation::tick`].

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;

use crate::error::{FailureReason, Result, TelemetryError};
use crate::events::{EventBus, StationEvent};
use crate::input::{DeviceBackend, DeviceInfo, InputManager, KEYBOARD_GUID, Key, PILOT_SLOTS};
use crate::link::{
    ConnectionStatus, LOCALHOST, RobotAddress, SessionContext, SessionEvent, SessionHandle, SessionMessage,
};
use crate::robot::{ProgramStatus, RobotMode, RobotState, RobotStatus};
use crate::settings::{self, RefreshRates, SettingsStore};
use crate::telemetry::{StatusReadings, TelemetryStatus, TelemetryStore, TelemetryValue, TelemetryVariable};
use crate::udp::{ROBOT_PORT, UdpChannel};

/// Controller hot-plug scan period.
const DEVICE_SCAN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StationConfig {
    /// UDP port of the robot program.
    pub robot_port: u16,
    /// Axis nudge per key press of the virtual keyboard.
    pub keyboard_step: f32,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            robot_port: ROBOT_PORT,
            keyboard_step: 1.0,
        }
    }
}

/// Everything a UI shows, serialized for the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct StationSnapshot {
    pub connection_status: ConnectionStatus,
    pub robot_address: String,
    pub available_addresses: Vec<String>,
    pub signal_strength: u8,
    pub ping_ms: f32,
    pub udp_avg_dt_ms: f32,
    pub mode: RobotMode,
    pub robot_status: RobotStatus,
    pub program_status: ProgramStatus,
    pub enabled: bool,
    pub auto_disable: bool,
    pub elapsed_ms: u64,
    pub program_last_update: String,
    pub readings: StatusReadings,
    pub skipped_frames: f32,
    pub frame_time: f32,
    pub telemetry_status: TelemetryStatus,
    pub telemetry_frozen: bool,
    pub variables: Vec<TelemetryVariable>,
    pub devices: Vec<DeviceInfo>,
    pub pilots: [Option<String>; PILOT_SLOTS],
    pub pilot_active: [bool; PILOT_SLOTS],
}

pub struct DriverStation {
    settings: Box<dyn SettingsStore>,
    context: SessionContext,
    robot: RobotState,
    telemetry: TelemetryStore,
    input: InputManager,
    udp: UdpChannel,
    rates: RefreshRates,

    status: ConnectionStatus,
    address: String,
    host: String,
    available_addresses: Vec<String>,
    signal_strength: u8,
    ping_ms: f32,

    session: Option<SessionHandle>,
    /// Cancelled workers still releasing the robot, reaped by `tick`.
    retiring: Vec<SessionHandle>,
    generation: u64,
    session_tx: Sender<SessionMessage>,
    session_rx: Receiver<SessionMessage>,

    last_device_scan: Option<Instant>,
    events: Vec<StationEvent>,
    bus: EventBus,
}

impl DriverStation {
    pub fn new(
        settings: Box<dyn SettingsStore>,
        devices: Box<dyn DeviceBackend>,
        context: SessionContext,
        config: StationConfig,
    ) -> Result<Self> {
        let rates = settings::refresh_rates(settings.as_ref());
        let auto_disable = settings::auto_disable(settings.as_ref());
        let available_addresses = settings::available_addresses(settings.as_ref())
            .into_iter()
            .filter(|a| !a.is_empty())
            .collect();
        let udp = UdpChannel::new(config.robot_port, rates)?;
        let mut input = InputManager::new(devices, config.keyboard_step);
        input.assign_pilot(0, Some(KEYBOARD_GUID.to_string()));
        let (session_tx, session_rx) = unbounded();

        let mut station = DriverStation {
            settings,
            context,
            robot: RobotState::new(auto_disable),
            telemetry: TelemetryStore::new(),
            input,
            udp,
            rates,
            status: ConnectionStatus::Disconnected,
            address: String::new(),
            host: String::new(),
            available_addresses,
            signal_strength: 0,
            ping_ms: 0.0,
            session: None,
            retiring: Vec::new(),
            generation: 0,
            session_tx,
            session_rx,
            last_device_scan: None,
            events: Vec::new(),
            bus: EventBus::new(),
        };
        if station.available_addresses.is_empty() {
            station.add_address(LOCALHOST);
        }
        Ok(station)
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&StationEvent) + Send + 'static,
    {
        self.bus.subscribe(listener);
    }

    /// Address persisted by the previous run, if any.
    pub fn saved_address(&self) -> Option<String> {
        settings::robot_address(self.settings.as_ref())
    }

    // ---- Accessors ----

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn robot_address(&self) -> &str {
        &self.address
    }

    pub fn available_addresses(&self) -> &[String] {
        &self.available_addresses
    }

    pub fn signal_strength(&self) -> u8 {
        self.signal_strength
    }

    pub fn ping_ms(&self) -> f32 {
        self.ping_ms
    }

    pub fn avg_interval_ms(&self) -> f32 {
        self.udp.avg_interval_ms()
    }

    pub fn refresh_rates(&self) -> RefreshRates {
        self.rates
    }

    pub fn robot(&self) -> &RobotState {
        &self.robot
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    pub fn input(&self) -> &InputManager {
        &self.input
    }

    pub fn snapshot(&mut self, now: Instant) -> StationSnapshot {
        let wall_clock = chrono::Local::now().naive_local();
        StationSnapshot {
            connection_status: self.status,
            robot_address: self.address.clone(),
            available_addresses: self.available_addresses.clone(),
            signal_strength: self.signal_strength,
            ping_ms: self.ping_ms,
            udp_avg_dt_ms: self.udp.avg_interval_ms(),
            mode: self.robot.mode(),
            robot_status: self.robot.status(),
            program_status: self.robot.program_status(),
            enabled: self.robot.enabled(),
            auto_disable: self.robot.auto_disable(),
            elapsed_ms: self.robot.elapsed(now).as_millis() as u64,
            program_last_update: self.robot.program_last_update(wall_clock),
            readings: *self.telemetry.readings(),
            skipped_frames: self.telemetry.skipped_frames(now),
            frame_time: self.telemetry.frame_time(now),
            telemetry_status: self.telemetry.status(),
            telemetry_frozen: self.telemetry.frozen(),
            variables: self.telemetry.variables().iter().cloned().collect(),
            devices: self.input.list_devices(),
            pilots: [
                self.input.pilot(0).map(str::to_string),
                self.input.pilot(1).map(str::to_string),
            ],
            pilot_active: [self.input.is_pilot_active(0), self.input.is_pilot_active(1)],
        }
    }

    // ---- Connection ----

    /// Connect to `address`, dropping any current connection first.
    pub fn connect(&mut self, address: &str) {
        let address = address.trim();
        if address == self.address {
            return;
        }
        self.disconnect();
        if address.is_empty() {
            return;
        }
        self.set_robot_address(address, true);

        if address == LOCALHOST {
            self.set_connection_status(ConnectionStatus::Connected);
            self.set_signal(crate::link::signal::MAX_STRENGTH, 0.0);
            self.start_udp(LOCALHOST);
            return;
        }

        let parsed = match RobotAddress::parse(address) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.events.push(StationEvent::ConnectionFailed {
                    reason: FailureReason::Unreachable,
                    message: e.to_string(),
                });
                self.disconnect();
                return;
            }
        };
        self.generation += 1;
        log::info!("Connecting to {} (session {})", parsed, self.generation);
        self.session = Some(SessionHandle::spawn(
            parsed,
            self.generation,
            self.context.clone(),
            self.session_tx.clone(),
        ));
    }

    /// Operator disconnect: the address is forgotten for the next start.
    pub fn disconnect(&mut self) {
        self.teardown(true);
    }

    /// Disconnect but keep the saved address, for application exit.
    pub fn close(&mut self) {
        self.teardown(false);
    }

    /// Disable the robot, send one neutral frame and disconnect.
    pub fn shutdown(&mut self, now: Instant) {
        self.robot.set_enabled(false, now);
        if let Err(e) = self.udp.send_neutral(self.robot.mode(), now) {
            log::warn!("Could not send neutral frame: {}", e);
        }
        self.close();
        self.flush_events();
    }

    fn teardown(&mut self, forget_address: bool) {
        if let Some(session) = self.session.take() {
            session.cancel();
            self.retiring.push(session);
        }
        self.udp.stop();
        if !self.address.is_empty() {
            self.set_robot_address("", forget_address);
        }
        self.host.clear();
        let was_connected = self.status != ConnectionStatus::Disconnected;
        self.set_connection_status(ConnectionStatus::Disconnected);
        self.set_signal(0, 0.0);
        self.telemetry.clear();
        self.robot.set_program_status(ProgramStatus::Idle, Instant::now());
        if was_connected {
            self.events.push(StationEvent::Disconnected);
        }
    }

    fn start_udp(&mut self, host: &str) {
        match self.udp.start(host) {
            Ok(()) => {
                self.host = host.to_string();
                self.events.push(StationEvent::ConnectionSucceeded(host.to_string()));
            }
            Err(e) => {
                log::error!("{}", e);
                self.connection_lost("Impossible to reach the robot over UDP. See the log for details.");
            }
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        let host = if self.host.is_empty() {
            self.address.clone()
        } else {
            self.host.clone()
        };
        self.events.push(StationEvent::ConnectionLost {
            host,
            reason: reason.to_string(),
        });
        self.disconnect();
    }

    fn handle_session_messages(&mut self) {
        let messages: Vec<SessionMessage> = self.session_rx.try_iter().collect();
        for message in messages {
            let current = self.session.as_ref().map(SessionHandle::generation);
            if current != Some(message.generation) {
                log::debug!("Dropping message of stale session {}", message.generation);
                continue;
            }
            match message.event {
                SessionEvent::Status(status) => self.set_connection_status(status),
                SessionEvent::Signal { strength, ping_ms } => self.set_signal(strength, ping_ms),
                SessionEvent::Connected { host } => self.start_udp(&host),
                SessionEvent::Failed { reason, message } => {
                    self.events.push(StationEvent::ConnectionFailed { reason, message });
                    self.disconnect();
                }
                SessionEvent::Lost { reason } => self.connection_lost(&reason),
                SessionEvent::StatusReport(report) => {
                    let readings = self.telemetry.refresh_status(&report);
                    self.robot.set_program_date(readings.program_date);
                }
                SessionEvent::Finished => {
                    if self.status != ConnectionStatus::Disconnected {
                        self.disconnect();
                    }
                }
            }
        }
    }

    // ---- Address book ----

    pub fn add_address(&mut self, address: &str) {
        let address = address.trim();
        if address.is_empty() || self.available_addresses.iter().any(|a| a == address) {
            return;
        }
        self.available_addresses.push(address.to_string());
        self.save_addresses();
    }

    pub fn remove_address(&mut self, address: &str) {
        if address == self.address {
            self.disconnect();
        }
        let before = self.available_addresses.len();
        self.available_addresses.retain(|a| a != address);
        if self.available_addresses.len() != before {
            self.save_addresses();
        }
    }

    fn save_addresses(&mut self) {
        self.events
            .push(StationEvent::AvailableAddressesChanged(self.available_addresses.clone()));
        if let Err(e) = settings::set_available_addresses(self.settings.as_mut(), &self.available_addresses) {
            log::warn!("Failed to save addresses: {}", e);
        }
    }

    fn set_robot_address(&mut self, address: &str, save: bool) {
        self.address = address.to_string();
        self.events
            .push(StationEvent::RobotAddressChanged(Some(address.to_string()).filter(|a| !a.is_empty())));
        if save {
            let saved = Some(address).filter(|a| !a.is_empty());
            if let Err(e) = settings::set_robot_address(self.settings.as_mut(), saved) {
                log::warn!("Failed to save robot address: {}", e);
            }
        }
    }

    fn set_connection_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.events.push(StationEvent::ConnectionStatusChanged(status));
        }
    }

    fn set_signal(&mut self, strength: u8, ping_ms: f32) {
        if self.signal_strength != strength || self.ping_ms != ping_ms {
            self.signal_strength = strength;
            self.ping_ms = ping_ms;
            self.events.push(StationEvent::SignalStrengthChanged { strength, ping_ms });
        }
    }

    // ---- Robot control ----

    pub fn set_mode(&mut self, mode: RobotMode, now: Instant) {
        self.robot.set_mode(mode, now);
    }

    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        self.robot.set_enabled(enabled, now);
    }

    pub fn set_auto_disable(&mut self, value: bool) {
        self.robot.set_auto_disable(value);
        if let Err(e) = settings::set_auto_disable(self.settings.as_mut(), value) {
            log::warn!("Failed to save auto-disable: {}", e);
        }
    }

    pub fn set_refresh_rates(&mut self, rates: RefreshRates) {
        if self.rates == rates {
            return;
        }
        self.rates = rates;
        self.udp.set_refresh_rates(rates);
        self.events.push(StationEvent::RefreshRatesChanged);
        if let Err(e) = settings::set_refresh_rates(self.settings.as_mut(), &rates) {
            log::warn!("Failed to save refresh rates: {}", e);
        }
    }

    pub fn set_pilot(&mut self, slot: usize, device: Option<String>) {
        self.input.assign_pilot(slot, device);
    }

    /// Return enables, Space disables, other keys drive the virtual keyboard.
    pub fn key_event(&mut self, key: Key, pressed: bool, now: Instant) -> bool {
        match key {
            Key::Return if pressed => {
                self.robot.set_enabled(true, now);
                true
            }
            Key::Space if pressed => {
                self.robot.set_enabled(false, now);
                true
            }
            Key::Return | Key::Space => true,
            _ => self.input.key_event(key, pressed),
        }
    }

    pub fn set_variable(&mut self, index: usize, value: TelemetryValue) -> std::result::Result<(), TelemetryError> {
        self.telemetry.set_variable(index, value)
    }

    pub fn set_telemetry_frozen(&mut self, frozen: bool) {
        self.telemetry.set_frozen(frozen);
    }

    // ---- Event loop ----

    /// One loop step. Returns the notifications published during the step.
    pub fn tick(&mut self, now: Instant) -> Vec<StationEvent> {
        self.handle_session_messages();
        self.retiring.retain(|s| !s.is_finished());

        if self
            .last_device_scan
            .is_none_or(|t| now.saturating_duration_since(t) >= DEVICE_SCAN_PERIOD)
        {
            self.last_device_scan = Some(now);
            self.input.refresh_devices();
        }
        let pilots = self.input.poll();

        self.udp.poll_received(now, &mut self.robot, &mut self.telemetry);
        self.robot.tick(now);
        if let Err(e) = self.udp.tick(now, &mut self.robot, &mut self.telemetry, pilots) {
            log::error!("{}", e);
            self.connection_lost("Impossible to send UDP message. See the log for details.");
        }

        self.flush_events()
    }

    fn flush_events(&mut self) -> Vec<StationEvent> {
        let mut events = std::mem::take(&mut self.events);
        events.extend(self.robot.take_events());
        events.extend(self.input.take_events());
        events.extend(self.udp.take_events());
        events.extend(self.telemetry.take_events());
        self.bus.emit_all(events.iter().cloned());
        events
    }
}

impl Drop for DriverStation {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
        for mut session in self.retiring.drain(..) {
            session.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NoDevices;
    use crate::error::RemoteError;
    use crate::link::SessionConfig;
    use crate::link::remote::{CancelToken, Pinger, RemoteConnector, RemoteShell};
    use crate::link::signal::PingReport;
    use crate::settings::MemorySettings;
    use std::net::UdpSocket;
    use std::sync::Arc;

    struct Unreachable;

    impl Pinger for Unreachable {
        fn ping(&self, _host: &str) -> PingReport {
            PingReport::unreachable()
        }
    }

    struct Reachable;

    impl Pinger for Reachable {
        fn ping(&self, _host: &str) -> PingReport {
            PingReport {
                alive: true,
                avg_rtt_ms: 10.0,
                max_rtt_ms: 10.0,
                packet_loss: 0.0,
            }
        }
    }

    struct NoShell;

    impl RemoteConnector for NoShell {
        fn open(
            &self,
            _address: &RobotAddress,
            _timeout: Duration,
            _cancel: &CancelToken,
        ) -> std::result::Result<Box<dyn RemoteShell>, RemoteError> {
            Err(RemoteError::Unreachable("test".into()))
        }
    }

    /// Login that ignores cancellation and only gives up after `delay`.
    struct StuckShell {
        delay: Duration,
    }

    impl RemoteConnector for StuckShell {
        fn open(
            &self,
            _address: &RobotAddress,
            _timeout: Duration,
            _cancel: &CancelToken,
        ) -> std::result::Result<Box<dyn RemoteShell>, RemoteError> {
            std::thread::sleep(self.delay);
            Err(RemoteError::Timeout)
        }
    }

    /// Station plus the socket standing in for the robot program.
    fn station(settings: MemorySettings) -> (DriverStation, UdpSocket) {
        station_with(settings, Arc::new(NoShell), Arc::new(Unreachable))
    }

    fn station_with(
        settings: MemorySettings,
        connector: Arc<dyn RemoteConnector>,
        pinger: Arc<dyn Pinger>,
    ) -> (DriverStation, UdpSocket) {
        let robot = UdpSocket::bind("127.0.0.1:0").unwrap();
        let context = SessionContext {
            connector,
            pinger,
            config: Arc::new(SessionConfig {
                hostname: "test-station".to_string(),
                ..SessionConfig::default()
            }),
        };
        let config = StationConfig {
            robot_port: robot.local_addr().unwrap().port(),
            ..StationConfig::default()
        };
        let station = DriverStation::new(Box::new(settings), Box::new(NoDevices), context, config).unwrap();
        (station, robot)
    }

    fn wait_for(station: &mut DriverStation, pred: impl Fn(&StationEvent) -> bool) -> Vec<StationEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut all = Vec::new();
        while Instant::now() < deadline {
            let events = station.tick(Instant::now());
            let done = events.iter().any(&pred);
            all.extend(events);
            if done {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        all
    }

    #[test]
    fn test_localhost_added_when_empty() {
        let (s, _robot) = station(MemorySettings::new());
        assert_eq!(s.available_addresses(), &["localhost".to_string()]);
        assert_eq!(s.input().pilot(0), Some(KEYBOARD_GUID));
    }

    #[test]
    fn test_localhost_connect_and_disconnect() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.connect("localhost");
        assert_eq!(s.connection_status(), ConnectionStatus::Connected);
        assert_eq!(s.signal_strength(), 5);
        assert_eq!(s.saved_address().as_deref(), Some("localhost"));
        let events = s.tick(Instant::now());
        assert!(events.contains(&StationEvent::ConnectionSucceeded("localhost".to_string())));

        // Same address again is a no-op
        s.connect("localhost");
        assert!(!s.tick(Instant::now()).contains(&StationEvent::Disconnected));

        s.disconnect();
        assert_eq!(s.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(s.robot_address(), "");
        assert_eq!(s.saved_address(), None);
        assert!(s.tick(Instant::now()).contains(&StationEvent::Disconnected));
    }

    #[test]
    fn test_close_keeps_saved_address() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.connect("localhost");
        s.close();
        assert_eq!(s.saved_address().as_deref(), Some("localhost"));
    }

    #[test]
    fn test_failed_connection_disconnects() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.connect("10.255.255.1");
        let events = wait_for(&mut s, |e| matches!(e, StationEvent::ConnectionFailed { .. }));
        assert!(events.contains(&StationEvent::ConnectionStatusChanged(ConnectionStatus::Pinging)));
        assert!(events.iter().any(|e| matches!(
            e,
            StationEvent::ConnectionFailed { reason: FailureReason::Unreachable, .. }
        )));
        assert_eq!(s.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(s.robot_address(), "");
    }

    #[test]
    fn test_disconnect_does_not_wait_for_worker() {
        let (mut s, _robot) = station_with(
            MemorySettings::new(),
            Arc::new(StuckShell {
                delay: Duration::from_secs(2),
            }),
            Arc::new(Reachable),
        );
        s.connect("10.0.0.9");
        wait_for(&mut s, |e| {
            *e == StationEvent::ConnectionStatusChanged(ConnectionStatus::Authenticating)
        });
        assert_eq!(s.connection_status(), ConnectionStatus::Authenticating);

        let started = Instant::now();
        s.disconnect();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(s.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(s.retiring.len(), 1);

        // The late login failure belongs to a retired session
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while !s.retiring.is_empty() && Instant::now() < deadline {
            events.extend(s.tick(Instant::now()));
            std::thread::sleep(Duration::from_millis(20));
        }
        events.extend(s.tick(Instant::now()));
        assert!(s.retiring.is_empty());
        assert!(!events.iter().any(|e| matches!(e, StationEvent::ConnectionFailed { .. })));
        assert_eq!(s.connection_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_invalid_address() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.connect("robot:notaport");
        let events = s.tick(Instant::now());
        assert!(events.iter().any(|e| matches!(e, StationEvent::ConnectionFailed { .. })));
        assert_eq!(s.robot_address(), "");
    }

    #[test]
    fn test_address_book() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.add_address("10.0.0.2");
        s.add_address("10.0.0.2");
        assert_eq!(s.available_addresses().len(), 2);

        s.connect("localhost");
        s.remove_address("localhost");
        assert_eq!(s.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(s.available_addresses(), &["10.0.0.2".to_string()]);
        assert_eq!(settings::available_addresses(s.settings.as_ref()), vec!["10.0.0.2"]);
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let now = Instant::now();
        let (mut s, _robot) = station(MemorySettings::new());
        s.connect("localhost");
        s.robot.set_program_status(ProgramStatus::Running, now);

        assert!(s.key_event(Key::Return, true, now));
        assert!(s.robot().enabled());
        assert!(s.key_event(Key::Space, true, now));
        assert!(!s.robot().enabled());

        assert!(s.key_event(Key::W, true, now));
        s.tick(now);
        assert!(s.input().is_pilot_active(0));
    }

    #[test]
    fn test_auto_disable_persisted() {
        let (mut s, _robot) = station(MemorySettings::new());
        s.set_auto_disable(true);
        assert!(s.robot().auto_disable());
        assert!(settings::auto_disable(s.settings.as_ref()));
    }

    #[test]
    fn test_listeners_notified() {
        use std::sync::Mutex;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut s, _robot) = station(MemorySettings::new());
        let sink = Arc::clone(&seen);
        s.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        s.connect("localhost");
        s.tick(Instant::now());
        assert!(
            seen.lock()
                .unwrap()
                .contains(&StationEvent::ConnectionStatusChanged(ConnectionStatus::Connected))
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let (mut s, _robot) = station(MemorySettings::new());
        let snapshot = s.snapshot(Instant::now());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["connection_status"], "Disconnected");
        assert_eq!(json["pilots"][0], KEYBOARD_GUID);
    }
}
