//! WebSocket bridge for a UI process.
//!
//! Every client gets the latest station snapshot as JSON every 40 ms and
//! may send [`UiCommand`] messages back. Commands are queued on a channel
//! and applied by the event loop.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tungstenite::{Message, accept};

use crate::error::Result;
use crate::input::Key;
use crate::robot::RobotMode;
use crate::settings::RefreshRates;
use crate::station::DriverStation;
use crate::telemetry::TelemetryValue;

pub const DEFAULT_BRIDGE_ADDR: &str = "0.0.0.0:10013";

const PUSH_PERIOD: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiCommand {
    Connect { address: String },
    Disconnect,
    AddAddress { address: String },
    RemoveAddress { address: String },
    SetMode { mode: RobotMode },
    SetEnabled { enabled: bool },
    SetAutoDisable { value: bool },
    SetRefreshRates { rates: RefreshRates },
    SetPilot { slot: usize, device: Option<String> },
    Key { key: Key, pressed: bool },
    SetVariable { index: usize, value: TelemetryValue },
    FreezeTelemetry { frozen: bool },
}

/// Apply one UI command to the station.
pub fn apply_command(station: &mut DriverStation, command: UiCommand, now: Instant) {
    log::debug!("UI command {:?}", command);
    match command {
        UiCommand::Connect { address } => station.connect(&address),
        UiCommand::Disconnect => station.disconnect(),
        UiCommand::AddAddress { address } => station.add_address(&address),
        UiCommand::RemoveAddress { address } => station.remove_address(&address),
        UiCommand::SetMode { mode } => station.set_mode(mode, now),
        UiCommand::SetEnabled { enabled } => station.set_enabled(enabled, now),
        UiCommand::SetAutoDisable { value } => station.set_auto_disable(value),
        UiCommand::SetRefreshRates { rates } => station.set_refresh_rates(rates),
        UiCommand::SetPilot { slot, device } => station.set_pilot(slot, device),
        UiCommand::Key { key, pressed } => {
            station.key_event(key, pressed, now);
        }
        UiCommand::SetVariable { index, value } => {
            if let Err(e) = station.set_variable(index, value) {
                log::warn!("Rejected telemetry edit: {}", e);
            }
        }
        UiCommand::FreezeTelemetry { frozen } => station.set_telemetry_frozen(frozen),
    }
}

pub struct Bridge {
    local_addr: SocketAddr,
    latest: Arc<Mutex<Option<String>>>,
    commands: Receiver<UiCommand>,
}

impl Bridge {
    pub fn start(addr: &str) -> Result<Self> {
        let server = TcpListener::bind(addr)?;
        let local_addr = server.local_addr()?;
        log::info!("WebSocket server listening on {}", local_addr);

        let latest = Arc::new(Mutex::new(None));
        let (tx, commands) = unbounded();
        let shared = Arc::clone(&latest);
        thread::Builder::new()
            .name("ws-accept".to_string())
            .spawn(move || accept_loop(server, shared, tx))?;

        Ok(Bridge {
            local_addr,
            latest,
            commands,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replace the payload pushed to clients.
    pub fn publish<T: Serialize>(&self, snapshot: &T) {
        match serde_json::to_string(snapshot) {
            Ok(json) => *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(json),
            Err(e) => log::error!("JSON serialization error: {}", e),
        }
    }

    /// Commands received since the last call.
    pub fn commands(&self) -> Vec<UiCommand> {
        self.commands.try_iter().collect()
    }
}

fn accept_loop(server: TcpListener, latest: Arc<Mutex<Option<String>>>, tx: Sender<UiCommand>) {
    for stream in server.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Connection error: {}", e);
                continue;
            }
        };
        let latest = Arc::clone(&latest);
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("ws-client".to_string())
            .spawn(move || client_loop(stream, latest, tx));
        if let Err(e) = spawned {
            log::error!("Failed to spawn WebSocket client thread: {}", e);
        }
    }
}

fn client_loop(stream: TcpStream, latest: Arc<Mutex<Option<String>>>, tx: Sender<UiCommand>) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    if let Err(e) = stream.set_read_timeout(Some(PUSH_PERIOD)) {
        log::warn!("Cannot set read timeout for {}: {}", peer, e);
        return;
    }
    let mut websocket = match accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("WebSocket handshake error: {}", e);
            return;
        }
    };
    log::info!("WebSocket client {} connected", peer);

    let mut last_push: Option<Instant> = None;
    loop {
        match websocket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<UiCommand>(&text) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("JSON parse error: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                log::debug!("WebSocket error: {}", e);
                break;
            }
        }

        if last_push.is_some_and(|t| t.elapsed() < PUSH_PERIOD) {
            continue;
        }
        let data = latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(json) = data {
            if websocket.send(Message::Text(json)).is_err() {
                break;
            }
        }
        last_push = Some(Instant::now());
    }
    log::info!("WebSocket client {} disconnected", peer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json() {
        let command: UiCommand = serde_json::from_str(r#"{"type":"Connect","address":"10.0.0.2"}"#).unwrap();
        assert_eq!(
            command,
            UiCommand::Connect {
                address: "10.0.0.2".to_string()
            }
        );
        let command: UiCommand = serde_json::from_str(r#"{"type":"Key","key":"Return","pressed":true}"#).unwrap();
        assert_eq!(
            command,
            UiCommand::Key {
                key: Key::Return,
                pressed: true
            }
        );
        let command: UiCommand = serde_json::from_str(r#"{"type":"SetVariable","index":2,"value":true}"#).unwrap();
        assert_eq!(
            command,
            UiCommand::SetVariable {
                index: 2,
                value: TelemetryValue::Bool(true)
            }
        );
        assert!(serde_json::from_str::<UiCommand>(r#"{"type":"Launch"}"#).is_err());
    }

    #[test]
    fn test_client_round_trip() {
        let bridge = Bridge::start("127.0.0.1:0").unwrap();
        bridge.publish(&serde_json::json!({ "connection_status": "Disconnected" }));

        let url = format!("ws://{}", bridge.local_addr());
        let (mut client, _) = tungstenite::connect(url).unwrap();
        client
            .send(Message::Text(r#"{"type":"SetEnabled","enabled":true}"#.to_string()))
            .unwrap();

        let pushed = loop {
            if let Message::Text(text) = client.read().unwrap() {
                break text;
            }
        };
        let value: serde_json::Value = serde_json::from_str(&pushed).unwrap();
        assert_eq!(value["connection_status"], "Disconnected");

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut received = Vec::new();
        while received.is_empty() && Instant::now() < deadline {
            received = bridge.commands();
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received, vec![UiCommand::SetEnabled { enabled: true }]);
    }
}
