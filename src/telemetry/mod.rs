//! Last-known telemetry of the robot.
//!
//! Two feeds end up here: status lines pulled over the command channel
//! (battery, CPU, program upload time) and the variable table carried by
//! UDP response frames.

pub mod average;
pub mod status;
pub mod variables;

use std::time::Instant;

use serde::Serialize;

use crate::error::TelemetryError;
use crate::events::StationEvent;
pub use average::TimedAverage;
pub use status::StatusReadings;
pub use variables::{SNAPSHOT_MARKER, TelemetryValue, TelemetryVariable, VarType, VariableTable};

/// Returned by averages when no sample is in the window.
pub const NO_DATA: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TelemetryStatus {
    Unavailable,
    Connected,
}

pub struct TelemetryStore {
    readings: StatusReadings,
    variables: VariableTable,
    status: TelemetryStatus,
    frozen: bool,
    skipped_frames: TimedAverage,
    frame_time: TimedAverage,
    events: Vec<StationEvent>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        TelemetryStore::new()
    }
}

impl TelemetryStore {
    pub fn new() -> Self {
        TelemetryStore {
            readings: StatusReadings::default(),
            variables: VariableTable::default(),
            status: TelemetryStatus::Unavailable,
            frozen: false,
            skipped_frames: TimedAverage::default(),
            frame_time: TimedAverage::default(),
            events: Vec::new(),
        }
    }

    pub fn readings(&self) -> &StatusReadings {
        &self.readings
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn status(&self) -> TelemetryStatus {
        self.status
    }

    pub fn frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        if self.frozen != frozen {
            self.frozen = frozen;
            self.events.push(StationEvent::TelemetryFrozenChanged(frozen));
        }
    }

    /// Apply a status report from the companion script.
    pub fn refresh_status(&mut self, report: &str) -> StatusReadings {
        let readings = StatusReadings::parse(report);
        if readings != self.readings {
            self.readings = readings;
            self.events.push(StationEvent::StatusReadingsChanged);
        }
        readings
    }

    /// Decode the telemetry part of a UDP response.
    ///
    /// An error leaves the previous schema in place; the caller should ask
    /// the robot for a fresh snapshot.
    pub fn apply_udp_payload(&mut self, payload: &[u8]) -> Result<(), TelemetryError> {
        let Some(&first) = payload.first() else {
            return Ok(());
        };
        if first == SNAPSHOT_MARKER {
            let text = String::from_utf8_lossy(&payload[1..]);
            let table = VariableTable::from_snapshot(&text)?;
            log::info!("Telemetry snapshot received: {} variables", table.len());
            self.variables = table;
            self.set_status(TelemetryStatus::Connected);
            self.notify_variables();
            return Ok(());
        }
        let result = self.variables.apply_delta(payload);
        match &result {
            Ok(changed) if !changed.is_empty() => self.notify_variables(),
            Ok(_) => {}
            Err(_) => self.notify_variables(),
        }
        result.map(|_| ())
    }

    /// Operator edit of an editable variable, sent with the next frame.
    pub fn set_variable(&mut self, index: usize, value: TelemetryValue) -> Result<(), TelemetryError> {
        self.variables.set_value(index, value)?;
        self.notify_variables();
        Ok(())
    }

    pub fn has_pending_edits(&self) -> bool {
        self.variables.has_pending_edits()
    }

    pub fn generate_telemetry_update(&mut self) -> Vec<u8> {
        self.variables.generate_update()
    }

    pub fn push_frame_stats(&mut self, now: Instant, skipped_frames: u8, frame_time: u8) {
        self.skipped_frames.push(now, skipped_frames as f32);
        self.frame_time.push(now, frame_time as f32);
    }

    pub fn skipped_frames(&mut self, now: Instant) -> f32 {
        self.skipped_frames.get(now, NO_DATA)
    }

    pub fn frame_time(&mut self, now: Instant) -> f32 {
        self.frame_time.get(now, NO_DATA)
    }

    /// Forget everything tied to the running robot program.
    pub fn clear_session(&mut self) {
        self.skipped_frames.clear();
        self.frame_time.clear();
        if !self.variables.is_empty() {
            self.variables = VariableTable::default();
            self.notify_variables();
        }
        self.set_status(TelemetryStatus::Unavailable);
    }

    /// Forget everything, status readings included.
    pub fn clear(&mut self) {
        self.clear_session();
        if self.readings != StatusReadings::default() {
            self.readings = StatusReadings::default();
            self.events.push(StationEvent::StatusReadingsChanged);
        }
    }

    pub fn take_events(&mut self) -> Vec<StationEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_status(&mut self, status: TelemetryStatus) {
        if self.status != status {
            self.status = status;
            self.events.push(StationEvent::TelemetryStatusChanged(status));
        }
    }

    fn notify_variables(&mut self) {
        if !self.frozen {
            self.events.push(StationEvent::TelemetryChanged);
        }
    }
}
