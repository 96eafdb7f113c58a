//! Robot enable/mode state machine and match timer.
//!
//! ```text
//!   IDLE ──program started──▶ DISABLED ◀──▶ ENABLED
//!    ▲                            │            │
//!    └────────program stopped─────┴────────────┘
//! ```
//!
//! The mode (autonomous / teleoperated / test) is orthogonal to the status.
//! Every mutator records the notifications it produces; the owner drains
//! them with [`RobotState::take_events`].

use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::events::StationEvent;
use crate::telemetry::status::describe_program_age;

/// Longest autonomous period before auto-disable.
pub const MAX_AUTO_TIME: Duration = Duration::from_secs(60);
/// Longest teleoperated period before auto-disable.
pub const MAX_TELEOP_TIME: Duration = Duration::from_secs(120);
/// Elapsed-time ticker period.
pub const TIMER_TICK: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotMode {
    Autonomous,
    Teleoperated,
    Test,
}

impl RobotMode {
    /// Index carried in the low bits of a frame flag byte (0 means disabled).
    pub fn wire_index(&self) -> u8 {
        match self {
            RobotMode::Autonomous => 1,
            RobotMode::Teleoperated => 2,
            RobotMode::Test => 3,
        }
    }

    pub fn from_wire_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(RobotMode::Autonomous),
            2 => Some(RobotMode::Teleoperated),
            3 => Some(RobotMode::Test),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramStatus {
    Idle,
    Starting,
    Running,
}

pub struct RobotState {
    mode: RobotMode,
    status: RobotStatus,
    program: ProgramStatus,
    auto_disable: bool,
    /// Elapsed time accumulated over finished enabled periods.
    elapsed: Duration,
    /// Start of the current enabled period, when the ticker runs.
    running_since: Option<Instant>,
    last_tick: Option<Instant>,
    program_date: Option<NaiveDateTime>,
    events: Vec<StationEvent>,
}

impl RobotState {
    pub fn new(auto_disable: bool) -> Self {
        RobotState {
            mode: RobotMode::Teleoperated,
            status: RobotStatus::Idle,
            program: ProgramStatus::Idle,
            auto_disable,
            elapsed: Duration::ZERO,
            running_since: None,
            last_tick: None,
            program_date: None,
            events: Vec::new(),
        }
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    pub fn status(&self) -> RobotStatus {
        self.status
    }

    pub fn program_status(&self) -> ProgramStatus {
        self.program
    }

    pub fn enabled(&self) -> bool {
        self.status == RobotStatus::Enabled
    }

    pub fn auto_disable(&self) -> bool {
        self.auto_disable
    }

    /// Time spent enabled in the current mode.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.elapsed
            + self
                .running_since
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or(Duration::ZERO)
    }

    pub fn program_date(&self) -> Option<NaiveDateTime> {
        self.program_date
    }

    /// Human readable age of the deployed robot program, empty when unknown.
    pub fn program_last_update(&self, now: NaiveDateTime) -> String {
        self.program_date
            .map(|date| describe_program_age(date, now))
            .unwrap_or_default()
    }

    /// Change mode: always disables the robot and resets the timer.
    pub fn set_mode(&mut self, mode: RobotMode, now: Instant) {
        if self.status != RobotStatus::Idle {
            self.set_status(RobotStatus::Disabled, now);
        }
        if self.mode != mode {
            self.mode = mode;
            self.events.push(StationEvent::ModeChanged(mode));
        }
        self.reset_timer(now);
    }

    /// Enable or disable. Ignored while no robot program is there to obey.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if self.program == ProgramStatus::Idle || (!enabled && self.status == RobotStatus::Idle) {
            return;
        }
        let status = if enabled { RobotStatus::Enabled } else { RobotStatus::Disabled };
        self.set_status(status, now);
    }

    pub fn set_auto_disable(&mut self, value: bool) {
        if self.auto_disable != value {
            self.auto_disable = value;
            self.events.push(StationEvent::AutoDisableChanged(value));
        }
    }

    pub fn set_program_status(&mut self, status: ProgramStatus, now: Instant) {
        if self.program == status {
            return;
        }
        let previous = self.program;
        self.program = status;
        match status {
            ProgramStatus::Running => {
                if previous == ProgramStatus::Idle {
                    self.events.push(StationEvent::ProgramStarting);
                }
                self.events.push(StationEvent::ProgramStarted);
                self.set_status(RobotStatus::Disabled, now);
            }
            ProgramStatus::Starting => {
                self.events.push(StationEvent::ProgramStarting);
            }
            ProgramStatus::Idle => {
                self.events.push(StationEvent::ProgramStopped);
                self.set_status(RobotStatus::Idle, now);
                self.set_program_date(None);
            }
        }
        log::info!("Robot program {:?} -> {:?}", previous, status);
        self.events.push(StationEvent::ProgramStatusChanged(status));
    }

    /// Adopt the mode a freshly discovered program reports, without side effects.
    pub fn adopt_mode(&mut self, mode: RobotMode) {
        if self.mode != mode {
            self.mode = mode;
            self.events.push(StationEvent::ModeChanged(mode));
        }
    }

    pub fn set_program_date(&mut self, date: Option<NaiveDateTime>) {
        if self.program_date != date {
            self.program_date = date;
            self.events.push(StationEvent::ProgramLastUpdateChanged);
        }
    }

    /// Drive the elapsed-time ticker and the auto-disable policy.
    pub fn tick(&mut self, now: Instant) {
        if self.running_since.is_none() {
            return;
        }
        if self
            .last_tick
            .is_some_and(|t| now.saturating_duration_since(t) < TIMER_TICK)
        {
            return;
        }
        self.last_tick = Some(now);
        let elapsed = self.elapsed(now);
        self.events.push(StationEvent::ElapsedChanged(elapsed));

        if !self.auto_disable {
            return;
        }
        match self.mode {
            RobotMode::Autonomous if elapsed >= MAX_AUTO_TIME => {
                log::info!("Autonomous period over, disabling robot");
                self.set_status(RobotStatus::Disabled, now);
            }
            RobotMode::Teleoperated if elapsed >= MAX_TELEOP_TIME => {
                log::info!("Teleoperated period over, disabling robot");
                self.set_status(RobotStatus::Disabled, now);
                self.elapsed = MAX_TELEOP_TIME;
                self.events.push(StationEvent::ElapsedChanged(self.elapsed));
            }
            _ => {}
        }
    }

    pub fn take_events(&mut self) -> Vec<StationEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_status(&mut self, status: RobotStatus, now: Instant) {
        if self.status == status {
            return;
        }
        let was_enabled = self.enabled();
        self.status = status;
        self.events.push(StationEvent::RobotStatusChanged(status));
        if was_enabled != self.enabled() {
            self.events.push(StationEvent::EnabledChanged(self.enabled()));
        }

        if status == RobotStatus::Enabled {
            if self.auto_disable
                && self.mode == RobotMode::Teleoperated
                && self.elapsed(now) >= MAX_TELEOP_TIME
            {
                self.reset_timer(now);
            }
            self.start_timer(now);
        } else {
            self.stop_timer(now);
            if status == RobotStatus::Idle || self.mode == RobotMode::Autonomous {
                self.reset_timer(now);
            }
        }
    }

    fn start_timer(&mut self, now: Instant) {
        self.running_since = Some(now);
        self.last_tick = None;
    }

    fn stop_timer(&mut self, now: Instant) {
        if let Some(start) = self.running_since.take() {
            self.elapsed += now.saturating_duration_since(start);
        }
        self.last_tick = None;
    }

    fn reset_timer(&mut self, now: Instant) {
        self.elapsed = Duration::ZERO;
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
        self.events.push(StationEvent::ElapsedChanged(Duration::ZERO));
    }
}
