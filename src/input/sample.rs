use serde::{Deserialize, Serialize};

use crate::robot::RobotMode;

/// Axes at or below this magnitude read as centered.
pub const DEADZONE: f32 = 0.05;
/// Two samples whose axes differ by at most this are equivalent.
pub const AXIS_TOLERANCE: f32 = 0.05;

/// Idle value of an analog trigger.
pub const TRIGGER_IDLE: f32 = -1.0;

/// Canonical button layout. The discriminant is the bit index on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    LeftBumper = 4,
    RightBumper = 5,
    Back = 6,
    Start = 7,
    LeftStick = 8,
    RightStick = 9,
    Left = 10,
    Right = 11,
    Up = 12,
    Down = 13,
}

/// First bit used for device-specific buttons beyond the canonical ones.
pub const FIRST_EXTRA_BUTTON: u32 = 14;
/// Button slots available in a 4-byte mask.
pub const MAX_BUTTONS: u32 = 32;

/// Ordered set of pressed buttons, packed as the 4-byte wire bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSet(u32);

impl ButtonSet {
    pub fn from_bits(bits: u32) -> Self {
        ButtonSet(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.bit(button as u32)
    }

    pub fn bit(&self, index: u32) -> bool {
        index < MAX_BUTTONS && self.0 & (1 << index) != 0
    }

    pub fn with(self, button: Button, pressed: bool) -> Self {
        self.with_bit(button as u32, pressed)
    }

    pub fn with_bit(self, index: u32, pressed: bool) -> Self {
        if index >= MAX_BUTTONS {
            return self;
        }
        if pressed {
            ButtonSet(self.0 | (1 << index))
        } else {
            ButtonSet(self.0 & !(1 << index))
        }
    }
}

/// Normalized snapshot of one control device.
///
/// Sticks range over [-1, 1], triggers too with -1 meaning released.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub buttons: ButtonSet,
}

impl Default for InputSample {
    fn default() -> Self {
        InputSample {
            left_x: 0.0,
            left_y: 0.0,
            right_x: 0.0,
            right_y: 0.0,
            left_trigger: TRIGGER_IDLE,
            right_trigger: TRIGGER_IDLE,
            buttons: ButtonSet::default(),
        }
    }
}

impl InputSample {
    /// A centered, released sample.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Axes in wire order.
    pub fn axes(&self) -> [f32; 6] {
        [
            self.left_x,
            self.left_y,
            self.right_x,
            self.right_y,
            self.left_trigger,
            self.right_trigger,
        ]
    }

    pub fn with_axes(self, axes: [f32; 6]) -> Self {
        InputSample {
            left_x: axes[0],
            left_y: axes[1],
            right_x: axes[2],
            right_y: axes[3],
            left_trigger: axes[4],
            right_trigger: axes[5],
            ..self
        }
    }

    pub fn with_button(self, button: Button, pressed: bool) -> Self {
        InputSample {
            buttons: self.buttons.with(button, pressed),
            ..self
        }
    }

    pub fn with_buttons(self, buttons: ButtonSet) -> Self {
        InputSample { buttons, ..self }
    }

    pub fn is_neutral(&self) -> bool {
        *self == InputSample::neutral()
    }

    /// Fold small stick deflections to 0 and barely pressed triggers to idle.
    pub fn with_deadzone(self, deadzone: f32) -> Self {
        let stick = |v: f32| if v.abs() > deadzone { v } else { 0.0 };
        let trigger = |v: f32| if v > deadzone - 1.0 { v } else { TRIGGER_IDLE };
        InputSample {
            left_x: stick(self.left_x),
            left_y: stick(self.left_y),
            right_x: stick(self.right_x),
            right_y: stick(self.right_y),
            left_trigger: trigger(self.left_trigger),
            right_trigger: trigger(self.right_trigger),
            buttons: self.buttons,
        }
    }

    /// Same buttons and every axis within `axis_tolerance`.
    pub fn is_same(&self, other: &InputSample, axis_tolerance: f32) -> bool {
        self.buttons == other.buttons
            && self
                .axes()
                .iter()
                .zip(other.axes().iter())
                .all(|(a, b)| (a - b).abs() <= axis_tolerance)
    }
}

/// Everything a control frame carries, built fresh for each send.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverStationState {
    pub controller1: InputSample,
    pub controller2: InputSample,
    pub enabled: bool,
    pub mode: RobotMode,
}

impl DriverStationState {
    pub fn new(pilots: [InputSample; 2], enabled: bool, mode: RobotMode) -> Self {
        DriverStationState {
            controller1: pilots[0],
            controller2: pilots[1],
            enabled,
            mode,
        }
    }

    /// Both pilots neutral, robot disabled.
    pub fn neutral(mode: RobotMode) -> Self {
        Self::new([InputSample::neutral(); 2], false, mode)
    }

    /// Equivalence used to suppress redundant sends.
    pub fn is_same(&self, other: &DriverStationState) -> bool {
        self.enabled == other.enabled
            && self.mode == other.mode
            && self.controller1.is_same(&other.controller1, AXIS_TOLERANCE)
            && self.controller2.is_same(&other.controller2, AXIS_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadzone_folds_small_values() {
        let s = InputSample::neutral().with_axes([0.04, -0.05, 0.05, 0.2, -0.96, -0.94]);
        let f = s.with_deadzone(DEADZONE);
        assert_eq!(f.left_x, 0.0);
        assert_eq!(f.left_y, 0.0);
        assert_eq!(f.right_x, 0.0);
        assert_eq!(f.right_y, 0.2);
        // -0.96 <= -0.95 folds, -0.94 passes through
        assert_eq!(f.left_trigger, -1.0);
        assert_eq!(f.right_trigger, -0.94);
    }

    #[test]
    fn test_deadzone_keeps_values_above_threshold() {
        let s = InputSample::neutral().with_axes([0.051, -0.7, 1.0, -1.0, 0.0, 1.0]);
        assert_eq!(s.with_deadzone(DEADZONE), s);
    }

    #[test]
    fn test_is_same_within_tolerance() {
        let a = InputSample::neutral()
            .with_axes([0.5, 0.5, 0.0, 0.0, -1.0, -1.0])
            .with_button(Button::A, true);
        let b = a.with_axes([0.54, 0.46, 0.03, -0.05, -1.0, -0.96]);
        assert!(a.is_same(&a, AXIS_TOLERANCE));
        assert!(a.is_same(&b, AXIS_TOLERANCE));
        assert!(b.is_same(&a, AXIS_TOLERANCE));

        let c = a.with_axes([0.6, 0.5, 0.0, 0.0, -1.0, -1.0]);
        assert!(!a.is_same(&c, AXIS_TOLERANCE));

        let d = a.with_button(Button::A, false);
        assert!(!a.is_same(&d, AXIS_TOLERANCE));
    }

    #[test]
    fn test_state_equivalence_checks_enable_and_mode() {
        let base = DriverStationState::neutral(RobotMode::Teleoperated);
        let enabled = DriverStationState { enabled: true, ..base };
        let auto = DriverStationState { mode: RobotMode::Autonomous, ..base };
        assert!(base.is_same(&base));
        assert!(!base.is_same(&enabled));
        assert!(!base.is_same(&auto));
    }

    #[test]
    fn test_button_set_bits() {
        let set = ButtonSet::default()
            .with(Button::B, true)
            .with(Button::Down, true)
            .with_bit(20, true)
            .with_bit(40, true);
        assert_eq!(set.bits(), (1 << 1) | (1 << 13) | (1 << 20));
        assert!(set.is_pressed(Button::Down));
        assert!(!set.with(Button::Down, false).is_pressed(Button::Down));
    }
}
