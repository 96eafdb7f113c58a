//! Controller input: normalized samples, device mapping and pilot slots.

pub mod device;
pub mod manager;
pub mod sample;

pub use device::{DeviceBackend, InputDevice, Key, Keyboard, LayoutProfile, NoDevices, RawState, KEYBOARD_GUID};
pub use manager::{DeviceInfo, InputManager, PILOT_SLOTS};
pub use sample::{Button, ButtonSet, DriverStationState, InputSample};
