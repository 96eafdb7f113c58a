//! Persisted station settings.
//!
//! Components never reach a global: the owner passes a [`SettingsStore`]
//! in and the typed helpers below read or write the known keys.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::robot::{RobotMode, RobotStatus};

pub const KEY_AVAILABLE_ADDRESSES: &str = "availableAddresses";
pub const KEY_ROBOT_ADDRESS: &str = "robotAddress";
pub const KEY_REFRESH_RATES: &str = "refreshRates";
pub const KEY_AUTO_DISABLE: &str = "autoDisable";

/// Key/value store. Values are JSON so any serde type fits.
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// Settings kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: BTreeMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        MemorySettings::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings file, rewritten in full on every change.
#[derive(Debug)]
pub struct JsonSettings {
    settings_path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonSettings {
    /// Open the file at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut settings = JsonSettings {
            settings_path: path.into(),
            values: BTreeMap::new(),
        };
        match settings.load() {
            Ok(()) => log::info!("Settings loaded from {}", settings.settings_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", settings.settings_path.display())
            }
            Err(e) => return Err(e.into()),
        }
        Ok(settings)
    }

    pub fn save(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.values).map_err(io::Error::other)?;

        let mut file = fs::File::create(&self.settings_path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load(&mut self) -> io::Result<()> {
        let content = fs::read_to_string(&self.settings_path)?;
        self.values = serde_json::from_str(&content).map_err(io::Error::other)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.save()?;
        Ok(())
    }
}

/// Send interval bounds for one robot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl RateLimits {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        RateLimits { min_ms, max_ms }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms.max(self.min_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRates {
    pub idle: RateLimits,
    pub disabled: RateLimits,
    pub autonomous: RateLimits,
    pub teleoperated: RateLimits,
    pub test: RateLimits,
}

impl Default for RefreshRates {
    fn default() -> Self {
        RefreshRates {
            idle: RateLimits::new(100, 500),
            disabled: RateLimits::new(50, 200),
            autonomous: RateLimits::new(20, 100),
            teleoperated: RateLimits::new(20, 100),
            test: RateLimits::new(20, 100),
        }
    }
}

impl RefreshRates {
    pub fn for_state(&self, status: RobotStatus, mode: RobotMode) -> RateLimits {
        match status {
            RobotStatus::Idle => self.idle,
            RobotStatus::Disabled => self.disabled,
            RobotStatus::Enabled => match mode {
                RobotMode::Autonomous => self.autonomous,
                RobotMode::Teleoperated => self.teleoperated,
                RobotMode::Test => self.test,
            },
        }
    }
}

fn get_as<T: for<'de> Deserialize<'de>>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring malformed setting {}: {}", key, e);
            None
        }
    }
}

pub fn available_addresses(store: &dyn SettingsStore) -> Vec<String> {
    get_as(store, KEY_AVAILABLE_ADDRESSES).unwrap_or_default()
}

pub fn set_available_addresses(store: &mut dyn SettingsStore, addresses: &[String]) -> Result<()> {
    store.set(KEY_AVAILABLE_ADDRESSES, serde_json::to_value(addresses)?)
}

pub fn robot_address(store: &dyn SettingsStore) -> Option<String> {
    get_as::<String>(store, KEY_ROBOT_ADDRESS).filter(|a| !a.is_empty())
}

pub fn set_robot_address(store: &mut dyn SettingsStore, address: Option<&str>) -> Result<()> {
    store.set(KEY_ROBOT_ADDRESS, Value::String(address.unwrap_or_default().to_string()))
}

pub fn refresh_rates(store: &dyn SettingsStore) -> RefreshRates {
    get_as(store, KEY_REFRESH_RATES).unwrap_or_default()
}

pub fn set_refresh_rates(store: &mut dyn SettingsStore, rates: &RefreshRates) -> Result<()> {
    store.set(KEY_REFRESH_RATES, serde_json::to_value(rates)?)
}

pub fn auto_disable(store: &dyn SettingsStore) -> bool {
    get_as(store, KEY_AUTO_DISABLE).unwrap_or(false)
}

pub fn set_auto_disable(store: &mut dyn SettingsStore, value: bool) -> Result<()> {
    store.set(KEY_AUTO_DISABLE, Value::Bool(value))
}
