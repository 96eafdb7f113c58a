use std::collections::BTreeSet;

use serde::Serialize;

use super::device::{DeviceBackend, InputDevice, KEYBOARD_GUID, Key, Keyboard, LayoutProfile};
use super::sample::InputSample;
use crate::events::StationEvent;

/// Number of pilot slots feeding control frames.
pub const PILOT_SLOTS: usize = 2;

/// Public description of one selectable controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub guid: String,
    pub name: String,
}

/// Tracks plugged controllers, the two pilot slots and their latest samples.
pub struct InputManager {
    backend: Box<dyn DeviceBackend>,
    keyboard: Keyboard,
    /// Physical devices, sorted by GUID.
    devices: Vec<Box<dyn InputDevice>>,
    pilots: [Option<String>; PILOT_SLOTS],
    samples: [InputSample; PILOT_SLOTS],
    events: Vec<StationEvent>,
}

impl InputManager {
    pub fn new(backend: Box<dyn DeviceBackend>, keyboard_step: f32) -> Self {
        InputManager {
            backend,
            keyboard: Keyboard::new(keyboard_step),
            devices: Vec::new(),
            pilots: [None, None],
            samples: [InputSample::neutral(); PILOT_SLOTS],
            events: Vec::new(),
        }
    }

    /// Keyboard first, then physical devices in GUID order.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut list = vec![DeviceInfo {
            guid: KEYBOARD_GUID.to_string(),
            name: "Keyboard".to_string(),
        }];
        list.extend(self.devices.iter().map(|d| DeviceInfo {
            guid: d.guid(),
            name: d.name(),
        }));
        list
    }

    pub fn pilot(&self, slot: usize) -> Option<&str> {
        self.pilots.get(slot).and_then(|p| p.as_deref())
    }

    /// Assign a device to a slot. Taking the other slot's device swaps them.
    pub fn assign_pilot(&mut self, slot: usize, device: Option<String>) {
        if slot >= PILOT_SLOTS {
            log::warn!("Ignoring pilot assignment to unknown slot {}", slot);
            return;
        }
        let previous = self.pilots.clone();
        let other = 1 - slot;
        if device.is_some() && self.pilots[other] == device {
            self.pilots[other] = self.pilots[slot].take();
        }
        self.pilots[slot] = device;
        self.notify_pilot_changes(&previous);
    }

    /// Re-enumerate devices and reconcile the pilot slots.
    ///
    /// Slots keep their device unless it was unplugged; vacated slots are
    /// filled with newly plugged devices.
    pub fn refresh_devices(&mut self) {
        let previous_guids: BTreeSet<String> = self.devices.iter().map(|d| d.guid()).collect();

        let mut devices = self.backend.enumerate();
        devices.sort_by_key(|d| d.guid());
        let current_guids: BTreeSet<String> = devices.iter().map(|d| d.guid()).collect();
        self.devices = devices;

        let lost: BTreeSet<&String> = previous_guids.difference(&current_guids).collect();
        let mut new: Vec<&String> = current_guids.difference(&previous_guids).collect();
        if lost.is_empty() && new.is_empty() {
            return;
        }
        log::info!("Controllers changed: {} lost, {} new", lost.len(), new.len());
        self.events.push(StationEvent::DevicesChanged);

        let previous = self.pilots.clone();
        for pilot in self.pilots.iter_mut() {
            if pilot.as_ref().is_some_and(|g| lost.contains(g)) {
                *pilot = None;
            }
        }
        new.reverse();
        for pilot in self.pilots.iter_mut() {
            if pilot.is_none() {
                match new.pop() {
                    Some(guid) => *pilot = Some(guid.clone()),
                    None => break,
                }
            }
        }
        self.notify_pilot_changes(&previous);
    }

    /// Poll the device assigned to `slot`. Unassigned or missing devices read neutral.
    pub fn sample(&mut self, slot: usize) -> InputSample {
        let Some(guid) = self.pilot(slot).map(str::to_string) else {
            return InputSample::neutral();
        };
        if guid == KEYBOARD_GUID {
            return self.keyboard.state();
        }
        match self.devices.iter_mut().find(|d| d.guid() == guid) {
            Some(device) => {
                let raw = device.poll();
                LayoutProfile::select(raw.buttons.len(), raw.hats.len()).map(&raw)
            }
            None => InputSample::neutral(),
        }
    }

    /// Sample both slots, notify the ones that changed, and return them.
    pub fn poll(&mut self) -> [InputSample; PILOT_SLOTS] {
        for slot in 0..PILOT_SLOTS {
            let sample = self.sample(slot);
            if sample != self.samples[slot] {
                self.samples[slot] = sample;
                self.events.push(StationEvent::PilotStateChanged { slot });
            }
        }
        self.samples
    }

    pub fn is_pilot_active(&self, slot: usize) -> bool {
        self.samples.get(slot).is_some_and(|s| !s.is_neutral())
    }

    pub fn key_event(&mut self, key: Key, pressed: bool) -> bool {
        self.keyboard.key_event(key, pressed)
    }

    pub fn take_events(&mut self) -> Vec<StationEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify_pilot_changes(&mut self, previous: &[Option<String>; PILOT_SLOTS]) {
        for slot in 0..PILOT_SLOTS {
            if previous[slot] != self.pilots[slot] {
                self.events.push(StationEvent::PilotControllerChanged {
                    slot,
                    device: self.pilots[slot].clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::device::{NoDevices, RawState};
    use crate::input::sample::Button;
    use std::sync::{Arc, Mutex};

    struct FakeDevice {
        guid: String,
        raw: RawState,
    }

    impl InputDevice for FakeDevice {
        fn guid(&self) -> String {
            self.guid.clone()
        }
        fn name(&self) -> String {
            format!("Pad {}", self.guid)
        }
        fn poll(&mut self) -> RawState {
            self.raw.clone()
        }
    }

    /// Backend whose plugged GUID list can be changed from the test.
    #[derive(Clone, Default)]
    struct FakeBackend {
        plugged: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBackend {
        fn plug(&self, guids: &[&str]) {
            *self.plugged.lock().unwrap() = guids.iter().map(|g| g.to_string()).collect();
        }
    }

    impl DeviceBackend for FakeBackend {
        fn enumerate(&mut self) -> Vec<Box<dyn InputDevice>> {
            self.plugged
                .lock()
                .unwrap()
                .iter()
                .map(|g| {
                    let mut buttons = vec![false; 11];
                    buttons[0] = true;
                    Box::new(FakeDevice {
                        guid: g.clone(),
                        raw: RawState {
                            axes: vec![0.0, -1.0, 0.0, 0.0, -1.0, -1.0],
                            buttons,
                            hats: vec![(0, 0)],
                        },
                    }) as Box<dyn InputDevice>
                })
                .collect()
        }
    }

    #[test]
    fn test_devices_sorted_by_guid() {
        let backend = FakeBackend::default();
        backend.plug(&["zz", "aa", "mm"]);
        let mut manager = InputManager::new(Box::new(backend), 1.0);
        manager.refresh_devices();
        let guids: Vec<String> = manager.list_devices().into_iter().map(|d| d.guid).collect();
        assert_eq!(guids, vec!["KEYBOARD", "aa", "mm", "zz"]);
    }

    #[test]
    fn test_assign_swaps_when_taken() {
        let mut manager = InputManager::new(Box::new(NoDevices), 1.0);
        manager.assign_pilot(0, Some("a".into()));
        manager.assign_pilot(1, Some("b".into()));
        manager.take_events();

        manager.assign_pilot(0, Some("b".into()));
        assert_eq!(manager.pilot(0), Some("b"));
        assert_eq!(manager.pilot(1), Some("a"));
        assert_eq!(manager.take_events().len(), 2);
    }

    #[test]
    fn test_hotplug_keeps_slots_and_fills_vacated() {
        let backend = FakeBackend::default();
        backend.plug(&["pad1", "pad2"]);
        let mut manager = InputManager::new(Box::new(backend.clone()), 1.0);
        manager.refresh_devices();
        assert_eq!(manager.pilot(0), Some("pad1"));
        assert_eq!(manager.pilot(1), Some("pad2"));

        // pad1 unplugged, pad3 plugged: slot 1 untouched, slot 0 gets pad3
        backend.plug(&["pad2", "pad3"]);
        manager.take_events();
        manager.refresh_devices();
        assert_eq!(manager.pilot(0), Some("pad3"));
        assert_eq!(manager.pilot(1), Some("pad2"));
        let events = manager.take_events();
        assert!(events.contains(&StationEvent::DevicesChanged));

        // No change, no notification
        manager.refresh_devices();
        assert!(manager.take_events().is_empty());
    }

    #[test]
    fn test_sample_maps_device_and_keyboard() {
        let backend = FakeBackend::default();
        backend.plug(&["pad1"]);
        let mut manager = InputManager::new(Box::new(backend), 1.0);
        manager.refresh_devices();
        manager.assign_pilot(1, Some(KEYBOARD_GUID.into()));
        manager.key_event(Key::W, true);

        let [p1, p2] = manager.poll();
        assert_eq!(p1.left_y, -1.0);
        assert!(p1.buttons.is_pressed(Button::A));
        assert_eq!(p2.left_y, -1.0);
        assert!(manager.is_pilot_active(0));
        assert!(manager.is_pilot_active(1));
    }
}
