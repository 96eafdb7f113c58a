//! UDP frames exchanged with the robot program.
//!
//! # Wire Protocol
//!
//! Station to robot:
//! ```text
//! ┌───────┬──────────────────────────────┬──────────────────────────────┬────────────────────┐
//! │ flags │ pilot 1: 6 × i8 axes, u32 LE │ pilot 2: 6 × i8 axes, u32 LE │ telemetry edits    │
//! │ 1 B   │ 10 B                         │ 10 B                         │ [index][value] ... │
//! └───────┴──────────────────────────────┴──────────────────────────────┴────────────────────┘
//! ```
//! or the single byte [`HELLO_PROBE`] while no robot program is known.
//!
//! Robot to station:
//! ```text
//! ┌───────┬────────────────┬─────────────────┬───────────────────┐
//! │ flags │ skipped frames │ frame time (ms) │ telemetry payload │
//! └───────┴────────────────┴─────────────────┴───────────────────┘
//! ```
//!
//! Flag bits 0-1 carry the mode index of an enabled robot (0 when disabled),
//! bit 2 is set by a robot program still starting up, bit 7 asks the robot
//! for a full telemetry snapshot.

use crate::input::{DriverStationState, InputSample};
use crate::robot::RobotMode;

/// Well-known robot port.
pub const ROBOT_PORT: u16 = 5005;
/// "Hello, send me your full snapshot."
pub const HELLO_PROBE: u8 = 0x88;

pub const MODE_MASK: u8 = 0b0000_0011;
pub const STARTING_FLAG: u8 = 0b0000_0100;
pub const REQUEST_FULL_TELEMETRY: u8 = 0b1000_0000;

/// Axis resolution: one unit is 1/125.
pub const AXIS_SCALE: f32 = 125.0;

const PILOT_LEN: usize = 6 + 4;
pub const CONTROL_FRAME_LEN: usize = 1 + 2 * PILOT_LEN;
pub const RESPONSE_HEADER_LEN: usize = 3;

pub fn flags_byte(enabled: bool, mode: RobotMode, request_full: bool) -> u8 {
    let mut flags = if enabled { mode.wire_index() } else { 0 };
    if request_full {
        flags |= REQUEST_FULL_TELEMETRY;
    }
    flags
}

pub fn encode_axis(value: f32) -> i8 {
    (value * AXIS_SCALE).round().clamp(-AXIS_SCALE, AXIS_SCALE) as i8
}

fn encode_pilot(sample: &InputSample, out: &mut Vec<u8>) {
    for axis in sample.axes() {
        out.push(encode_axis(axis) as u8);
    }
    out.extend_from_slice(&sample.buttons.bits().to_le_bytes());
}

/// Build a control frame, appending pending telemetry edits after pilot 2.
pub fn encode_control(state: &DriverStationState, request_full: bool, telemetry_update: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CONTROL_FRAME_LEN + telemetry_update.len());
    frame.push(flags_byte(state.enabled, state.mode, request_full));
    encode_pilot(&state.controller1, &mut frame);
    encode_pilot(&state.controller2, &mut frame);
    frame.extend_from_slice(telemetry_update);
    frame
}

/// Decoded robot response; the telemetry payload stays borrowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseFrame<'a> {
    pub starting: bool,
    pub enabled: bool,
    pub mode: Option<RobotMode>,
    pub skipped_frames: u8,
    pub frame_time: u8,
    pub telemetry: &'a [u8],
}

pub fn decode_response(bytes: &[u8]) -> Option<ResponseFrame<'_>> {
    if bytes.len() < RESPONSE_HEADER_LEN {
        return None;
    }
    let flags = bytes[0];
    let mode_bits = flags & MODE_MASK;
    Some(ResponseFrame {
        starting: flags & STARTING_FLAG != 0,
        enabled: mode_bits != 0,
        mode: RobotMode::from_wire_index(mode_bits),
        skipped_frames: bytes[1],
        frame_time: bytes[2],
        telemetry: &bytes[RESPONSE_HEADER_LEN..],
    })
}
