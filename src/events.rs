//! Change notifications published by the station.
//!
//! Components queue [`StationEvent`]s as their state changes; the
//! [`DriverStation`](crate::station::DriverStation) drains them once per
//! loop step and hands them to every subscriber of its [`EventBus`].

use std::time::Duration;

use serde::Serialize;

use crate::error::FailureReason;
use crate::link::ConnectionStatus;
use crate::robot::{ProgramStatus, RobotMode, RobotStatus};
use crate::telemetry::TelemetryStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum StationEvent {
    // Robot state
    ModeChanged(RobotMode),
    RobotStatusChanged(RobotStatus),
    EnabledChanged(bool),
    AutoDisableChanged(bool),
    ElapsedChanged(Duration),
    ProgramStarting,
    ProgramStarted,
    ProgramStopped,
    ProgramStatusChanged(ProgramStatus),
    ProgramLastUpdateChanged,

    // Connection
    ConnectionStatusChanged(ConnectionStatus),
    ConnectionSucceeded(String),
    ConnectionFailed { reason: FailureReason, message: String },
    ConnectionLost { host: String, reason: String },
    Disconnected,
    RobotAddressChanged(Option<String>),
    AvailableAddressesChanged(Vec<String>),
    SignalStrengthChanged { strength: u8, ping_ms: f32 },
    UdpAvgIntervalChanged(f32),
    RefreshRatesChanged,

    // Input devices
    DevicesChanged,
    PilotControllerChanged { slot: usize, device: Option<String> },
    PilotStateChanged { slot: usize },

    // Telemetry
    TelemetryStatusChanged(TelemetryStatus),
    TelemetryChanged,
    TelemetryFrozenChanged(bool),
    StatusReadingsChanged,
}

pub type Listener = Box<dyn FnMut(&StationEvent) + Send>;

/// Listener registry. Listeners run in registration order on the loop thread.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&StationEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: &StationEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn emit_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = StationEvent>,
    {
        for event in events {
            log::debug!("Event {:?}", event);
            self.emit(&event);
        }
    }
}
