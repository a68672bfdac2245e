// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving simulator settings.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::ble_constants::{self, delivery};
use crate::bluetooth::protocol::FirmwareVersion;

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertising and GATT settings.
    pub bluetooth: BluetoothConfig,

    /// Version reported to clients.
    pub firmware: FirmwareVersion,

    /// Notification delivery settings.
    pub delivery: DeliveryConfig,

    /// Presentation settings.
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Name placed in the advertisement.
    pub local_name: String,

    pub service_uuid: Uuid,

    pub characteristic_uuid: Uuid,

    /// Power the adapter on at start-up if it is off.
    pub power_on_adapter: bool,

    /// Start advertising as soon as the adapter reports power.
    pub advertise_on_start: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            local_name: ble_constants::DEFAULT_LOCAL_NAME.to_string(),
            service_uuid: ble_constants::SERVICE_UUID,
            characteristic_uuid: ble_constants::CHARACTERISTIC_UUID,
            power_on_adapter: false,
            advertise_on_start: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Delay before retrying a rejected notification, in milliseconds.
    pub retry_delay_ms: u64,

    /// Notifications buffered per subscriber.
    pub notify_queue_depth: usize,

    /// Capacity of the core event queue.
    pub event_queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: delivery::RETRY_DELAY_MS,
            notify_queue_depth: delivery::NOTIFY_QUEUE_DEPTH,
            event_queue_capacity: delivery::EVENT_QUEUE_CAPACITY,
        }
    }
}

impl DeliveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Show the system tray icon.
    pub show_tray: bool,

    /// Echo messages listed in the tray menu.
    pub recent_messages: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_tray: true,
            recent_messages: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bluetooth: BluetoothConfig::default(),
            firmware: ble_constants::DEFAULT_FIRMWARE_VERSION,
            delivery: DeliveryConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wearable-sim")
            .join("config.toml")
    }

    /// Load configuration from the default location, writing defaults on
    /// first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a file or create it with defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the peripheral cannot run with.
    pub fn validate(&self) -> Result<()> {
        let name = &self.bluetooth.local_name;
        if name.is_empty() || name.len() > ble_constants::MAX_LOCAL_NAME_LEN {
            bail!(
                "local_name must be 1-{} bytes, got {}",
                ble_constants::MAX_LOCAL_NAME_LEN,
                name.len()
            );
        }
        if self.firmware.is_unset() {
            bail!("firmware version 0.0.0 is reserved");
        }
        if self.delivery.notify_queue_depth == 0 || self.delivery.event_queue_capacity == 0 {
            bail!("queue sizes must be non-zero");
        }
        Ok(())
    }
}
