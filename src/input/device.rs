//! Raw devices and their mapping onto the canonical [`InputSample`] layout.

use serde::{Deserialize, Serialize};

use super::sample::{Button, ButtonSet, DEADZONE, FIRST_EXTRA_BUTTON, InputSample, MAX_BUTTONS, TRIGGER_IDLE};

/// GUID reserved for the virtual keyboard device.
pub const KEYBOARD_GUID: &str = "KEYBOARD";

/// Unprocessed readings of one device, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawState {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    /// Each hat as (x, y) in {-1, 0, 1}.
    pub hats: Vec<(i8, i8)>,
}

/// A physical controller exposed by the device backend.
pub trait InputDevice: Send {
    /// Hardware GUID, stable across reconnections.
    fn guid(&self) -> String;

    fn name(&self) -> String;

    /// Read the current raw state.
    fn poll(&mut self) -> RawState;
}

/// Enumerates the controllers currently plugged in.
pub trait DeviceBackend: Send {
    fn enumerate(&mut self) -> Vec<Box<dyn InputDevice>>;
}

/// Backend exposing no physical controller. Only the keyboard is available.
#[derive(Debug, Default)]
pub struct NoDevices;

impl DeviceBackend for NoDevices {
    fn enumerate(&mut self) -> Vec<Box<dyn InputDevice>> {
        Vec::new()
    }
}

/// Fixed raw-to-canonical mappings, chosen from device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutProfile {
    /// 16 or 17 buttons and no hat: directional pad on buttons 11-14.
    A,
    /// Any hat: directional pad from the first hat.
    B,
    /// Everything else: ten canonical buttons, extras appended.
    C,
}

impl LayoutProfile {
    pub fn select(button_count: usize, hat_count: usize) -> Self {
        if (button_count == 16 || button_count == 17) && hat_count == 0 {
            LayoutProfile::A
        } else if hat_count > 0 {
            LayoutProfile::B
        } else {
            LayoutProfile::C
        }
    }

    /// Raw button index feeding each canonical button (directional pad excluded for B).
    fn button_map(&self) -> &'static [(Button, usize)] {
        use Button::*;
        match self {
            LayoutProfile::A => &[
                (A, 0),
                (B, 1),
                (X, 2),
                (Y, 3),
                (Back, 4),
                (Start, 6),
                (LeftStick, 7),
                (RightStick, 8),
                (LeftBumper, 9),
                (RightBumper, 10),
                (Up, 11),
                (Down, 12),
                (Left, 13),
                (Right, 14),
            ],
            LayoutProfile::B | LayoutProfile::C => &[
                (A, 0),
                (B, 1),
                (X, 2),
                (Y, 3),
                (LeftBumper, 4),
                (RightBumper, 5),
                (Back, 6),
                (Start, 7),
                (LeftStick, 8),
                (RightStick, 9),
            ],
        }
    }

    /// Raw buttons not covered by the canonical layout, in wire order.
    fn extra_buttons(&self, button_count: usize) -> Vec<usize> {
        match self {
            LayoutProfile::A => [5usize, 15, 16].into_iter().filter(|&i| i < button_count).collect(),
            LayoutProfile::B | LayoutProfile::C => (10..button_count).collect(),
        }
    }

    /// Map a raw reading to a deadzone-filtered sample.
    pub fn map(&self, raw: &RawState) -> InputSample {
        let axis = |i: usize, idle: f32| raw.axes.get(i).copied().unwrap_or(idle);
        let pressed = |i: usize| raw.buttons.get(i).copied().unwrap_or(false);

        let mut buttons = ButtonSet::default();
        for &(button, index) in self.button_map() {
            buttons = buttons.with(button, pressed(index));
        }
        if *self == LayoutProfile::B {
            let (x, y) = raw.hats.first().copied().unwrap_or((0, 0));
            buttons = buttons
                .with(Button::Left, x < 0)
                .with(Button::Right, x > 0)
                .with(Button::Up, y > 0)
                .with(Button::Down, y < 0);
        }
        for (offset, index) in self.extra_buttons(raw.buttons.len()).into_iter().enumerate() {
            let bit = FIRST_EXTRA_BUTTON + offset as u32;
            if bit >= MAX_BUTTONS {
                break;
            }
            buttons = buttons.with_bit(bit, pressed(index));
        }

        InputSample {
            left_x: axis(0, 0.0),
            left_y: axis(1, 0.0),
            right_x: axis(2, 0.0),
            right_y: axis(3, 0.0),
            left_trigger: axis(4, TRIGGER_IDLE),
            right_trigger: axis(5, TRIGGER_IDLE),
            buttons,
        }
        .with_deadzone(DEADZONE)
    }
}

/// Keys understood by the virtual keyboard device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    A,
    B,
    C,
    D,
    E,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    Q,
    S,
    W,
    X,
    Y,
    Z,
    Insert,
    Delete,
    Space,
    Return,
}

/// Virtual controller driven by key press/release events.
///
/// Movement keys nudge an axis by `step` on press and undo the nudge on
/// release, so opposite keys held together cancel out.
#[derive(Debug, Clone)]
pub struct Keyboard {
    step: f32,
    state: InputSample,
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard::new(1.0)
    }
}

impl Keyboard {
    pub fn new(step: f32) -> Self {
        Keyboard {
            step,
            state: InputSample::neutral(),
        }
    }

    pub fn state(&self) -> InputSample {
        self.state
    }

    /// Apply a key event. Returns false when the key has no mapping.
    pub fn key_event(&mut self, key: Key, pressed: bool) -> bool {
        let s = self.state;
        let direction = if pressed { 1.0 } else { -1.0 };
        let nudge = |v: f32, positive: bool| {
            let sign = if positive { 1.0 } else { -1.0 };
            (v + self.step * sign * direction).clamp(-1.0, 1.0)
        };
        let trigger = if pressed { self.step.min(1.0) } else { TRIGGER_IDLE };

        self.state = match key {
            Key::Right | Key::Left => InputSample { right_x: nudge(s.right_x, key == Key::Right), ..s },
            Key::Up | Key::Down => InputSample { right_y: nudge(s.right_y, key == Key::Down), ..s },
            Key::D | Key::A => InputSample { left_x: nudge(s.left_x, key == Key::D), ..s },
            Key::W | Key::S => InputSample { left_y: nudge(s.left_y, key == Key::S), ..s },
            Key::Z => InputSample { left_trigger: trigger, ..s },
            Key::C => InputSample { right_trigger: trigger, ..s },
            Key::B => s.with_button(Button::A, pressed),
            Key::H => s.with_button(Button::B, pressed),
            Key::G => s.with_button(Button::X, pressed),
            Key::Y => s.with_button(Button::Y, pressed),
            Key::Q => s.with_button(Button::LeftBumper, pressed),
            Key::E => s.with_button(Button::RightBumper, pressed),
            Key::Insert => s.with_button(Button::Back, pressed),
            Key::Delete => s.with_button(Button::Start, pressed),
            Key::X => s.with_button(Button::LeftStick, pressed),
            Key::M => s.with_button(Button::RightStick, pressed),
            Key::J => s.with_button(Button::Left, pressed),
            Key::L => s.with_button(Button::Right, pressed),
            Key::I => s.with_button(Button::Up, pressed),
            Key::K => s.with_button(Button::Down, pressed),
            Key::Space | Key::Return => return false,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(buttons: usize, hats: Vec<(i8, i8)>) -> RawState {
        RawState {
            axes: vec![0.5, -0.5, 0.02, 0.9, -1.0, 0.3],
            buttons: vec![false; buttons],
            hats,
        }
    }

    #[test]
    fn test_profile_selection() {
        assert_eq!(LayoutProfile::select(16, 0), LayoutProfile::A);
        assert_eq!(LayoutProfile::select(17, 0), LayoutProfile::A);
        assert_eq!(LayoutProfile::select(17, 1), LayoutProfile::B);
        assert_eq!(LayoutProfile::select(11, 1), LayoutProfile::B);
        assert_eq!(LayoutProfile::select(12, 0), LayoutProfile::C);
    }

    #[test]
    fn test_profile_a_dpad_from_buttons() {
        let mut r = raw(16, vec![]);
        r.buttons[11] = true; // up
        r.buttons[9] = true; // left bumper
        let s = LayoutProfile::A.map(&r);
        assert!(s.buttons.is_pressed(Button::Up));
        assert!(s.buttons.is_pressed(Button::LeftBumper));
        assert!(!s.buttons.is_pressed(Button::Back));
        assert_eq!(s.right_x, 0.0);
        assert_eq!(s.right_y, 0.9);
    }

    #[test]
    fn test_profile_b_dpad_from_hat() {
        let mut r = raw(11, vec![(-1, 1)]);
        r.buttons[10] = true;
        let s = LayoutProfile::B.map(&r);
        assert!(s.buttons.is_pressed(Button::Left));
        assert!(s.buttons.is_pressed(Button::Up));
        assert!(!s.buttons.is_pressed(Button::Right));
        assert!(!s.buttons.is_pressed(Button::Down));
        assert!(s.buttons.bit(FIRST_EXTRA_BUTTON));
    }

    #[test]
    fn test_missing_axes_default_to_idle() {
        let r = RawState {
            axes: vec![0.3, 0.3],
            buttons: vec![true; 4],
            hats: vec![],
        };
        let s = LayoutProfile::C.map(&r);
        assert_eq!(s.left_trigger, TRIGGER_IDLE);
        assert_eq!(s.right_x, 0.0);
        assert!(s.buttons.is_pressed(Button::Y));
        assert!(!s.buttons.is_pressed(Button::LeftBumper));
    }

    #[test]
    fn test_keyboard_nudges_and_clamps() {
        let mut kb = Keyboard::new(1.0);
        assert!(kb.key_event(Key::D, true));
        assert_eq!(kb.state().left_x, 1.0);
        // Opposite key cancels out
        kb.key_event(Key::A, true);
        assert_eq!(kb.state().left_x, 0.0);
        kb.key_event(Key::D, false);
        assert_eq!(kb.state().left_x, -1.0);
        kb.key_event(Key::A, false);
        assert_eq!(kb.state().left_x, 0.0);

        let mut half = Keyboard::new(0.5);
        half.key_event(Key::S, true);
        assert_eq!(half.state().left_y, 0.5);
    }

    #[test]
    fn test_keyboard_buttons_and_triggers() {
        let mut kb = Keyboard::default();
        kb.key_event(Key::B, true);
        kb.key_event(Key::Z, true);
        assert!(kb.state().buttons.is_pressed(Button::A));
        assert_eq!(kb.state().left_trigger, 1.0);
        kb.key_event(Key::B, false);
        kb.key_event(Key::Z, false);
        assert!(kb.state().is_neutral());
        assert!(!kb.key_event(Key::Space, true));
    }
}
