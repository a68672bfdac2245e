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

//! Peripheral lifecycle: radio power × advertising state.
//!
//! Transitions are driven only by radio events and user requests. The
//! machine never performs I/O itself; callers act on the returned outcome.

use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Power state reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioPower {
    Unknown,
    Unsupported,
    Unauthorized,
    Off,
    Resetting,
    On,
}

impl RadioPower {
    /// User-facing error for every state other than `On`.
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            RadioPower::On => None,
            RadioPower::Off => Some("Bluetooth is powered off"),
            RadioPower::Unauthorized => Some("Bluetooth permission denied"),
            RadioPower::Unsupported => Some("Bluetooth is not supported"),
            RadioPower::Resetting => Some("Bluetooth is resetting"),
            RadioPower::Unknown => Some("Bluetooth state unknown"),
        }
    }
}

impl fmt::Display for RadioPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioPower::Unknown => "unknown",
            RadioPower::Unsupported => "unsupported",
            RadioPower::Unauthorized => "unauthorized",
            RadioPower::Off => "off",
            RadioPower::Resetting => "resetting",
            RadioPower::On => "on",
        };
        f.write_str(s)
    }
}

/// Advertising state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advertising {
    Stopped,
    Starting,
    Active,
}

/// Rejected lifecycle requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Bluetooth is not powered on")]
    NotPoweredOn,

    #[error("Advertising is already in progress")]
    AlreadyAdvertising,
}

/// Result of an advertising-start report from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisingOutcome {
    Active,
    Failed,
    /// No start was pending; the radio should be told to stop again.
    Stale,
}

/// Coarse status for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralStatus {
    Unavailable,
    Idle,
    Advertising,
}

impl PeripheralStatus {
    pub fn of(power: RadioPower, advertising: Advertising) -> Self {
        match (power, advertising) {
            (RadioPower::On, Advertising::Active) => PeripheralStatus::Advertising,
            (RadioPower::On, _) => PeripheralStatus::Idle,
            _ => PeripheralStatus::Unavailable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeripheralStatus::Unavailable => "Bluetooth is not available",
            PeripheralStatus::Idle => "Not advertising",
            PeripheralStatus::Advertising => "Advertising",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            PeripheralStatus::Unavailable => "bluetooth-disabled",
            PeripheralStatus::Idle => "bluetooth-active",
            PeripheralStatus::Advertising => "network-transmit-receive",
        }
    }
}

/// The lifecycle state machine.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    power: RadioPower,
    advertising: Advertising,
    last_error: Option<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            power: RadioPower::Unknown,
            advertising: Advertising::Stopped,
            last_error: None,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(&self) -> RadioPower {
        self.power
    }

    pub fn advertising(&self) -> Advertising {
        self.advertising
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn status(&self) -> PeripheralStatus {
        PeripheralStatus::of(self.power, self.advertising)
    }

    /// Apply a power change. Losing power forces advertising off.
    pub fn power_changed(&mut self, power: RadioPower) {
        info!("Radio power: {} -> {}", self.power, power);
        self.power = power;

        match power.error_message() {
            Some(message) => {
                if self.advertising != Advertising::Stopped {
                    info!("Advertising stopped by power change");
                }
                self.advertising = Advertising::Stopped;
                self.last_error = Some(message.to_string());
            }
            None => {
                if self.advertising != Advertising::Starting {
                    self.last_error = None;
                }
            }
        }
    }

    /// Ask to start advertising. On success the state is `Starting` and
    /// the caller must request registration and advertising from the radio.
    pub fn request_start(&mut self) -> Result<(), LifecycleError> {
        let result = if self.power != RadioPower::On {
            Err(LifecycleError::NotPoweredOn)
        } else if self.advertising != Advertising::Stopped {
            Err(LifecycleError::AlreadyAdvertising)
        } else {
            Ok(())
        };

        match &result {
            Ok(()) => {
                debug!("Advertising start accepted");
                self.advertising = Advertising::Starting;
            }
            Err(e) => {
                warn!("Advertising start rejected: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Report of the GATT service registration.
    pub fn service_added(&mut self, result: Result<(), String>) {
        if let Err(reason) = result {
            warn!("Service registration failed: {}", reason);
            self.last_error = Some(format!("Failed to add service: {}", reason));
        }
    }

    /// Report of the advertisement start.
    pub fn advertising_started(&mut self, result: Result<(), String>) -> AdvertisingOutcome {
        if self.advertising != Advertising::Starting {
            debug!(
                "Ignoring advertising report while {:?}",
                self.advertising
            );
            return AdvertisingOutcome::Stale;
        }

        match result {
            Ok(()) => {
                info!("Advertising active");
                self.advertising = Advertising::Active;
                self.last_error = None;
                AdvertisingOutcome::Active
            }
            Err(reason) => {
                warn!("Advertising failed: {}", reason);
                self.advertising = Advertising::Stopped;
                self.last_error = Some(format!("Failed to start advertising: {}", reason));
                AdvertisingOutcome::Failed
            }
        }
    }

    /// Stop advertising. Always accepted and takes effect immediately.
    pub fn request_stop(&mut self) {
        debug!("Advertising stop requested while {:?}", self.advertising);
        self.advertising = Advertising::Stopped;
        self.last_error = None;
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered_on() -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.power_changed(RadioPower::On);
        lifecycle
    }

    #[test]
    fn test_initial_state() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.power(), RadioPower::Unknown);
        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
        assert_eq!(lifecycle.last_error(), None);
        assert_eq!(lifecycle.status(), PeripheralStatus::Unavailable);
    }

    #[test]
    fn test_start_gated_on_power() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.power_changed(RadioPower::Off);
        lifecycle.dismiss_error();

        assert_eq!(lifecycle.request_start(), Err(LifecycleError::NotPoweredOn));
        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
        assert_eq!(lifecycle.last_error(), Some("Bluetooth is not powered on"));
    }

    #[test]
    fn test_start_rejected_while_busy() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();

        assert_eq!(
            lifecycle.request_start(),
            Err(LifecycleError::AlreadyAdvertising)
        );
        assert_eq!(lifecycle.advertising(), Advertising::Starting);
    }

    #[test]
    fn test_advertising_success() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();
        assert_eq!(lifecycle.advertising(), Advertising::Starting);

        assert_eq!(
            lifecycle.advertising_started(Ok(())),
            AdvertisingOutcome::Active
        );
        assert_eq!(lifecycle.advertising(), Advertising::Active);
        assert_eq!(lifecycle.last_error(), None);
        assert_eq!(lifecycle.status(), PeripheralStatus::Advertising);
    }

    #[test]
    fn test_advertising_failure() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();

        assert_eq!(
            lifecycle.advertising_started(Err("busy".to_string())),
            AdvertisingOutcome::Failed
        );
        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
        assert_eq!(
            lifecycle.last_error(),
            Some("Failed to start advertising: busy")
        );
    }

    #[test]
    fn test_late_report_after_stop_is_stale() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();
        lifecycle.request_stop();

        assert_eq!(
            lifecycle.advertising_started(Ok(())),
            AdvertisingOutcome::Stale
        );
        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
    }

    #[test]
    fn test_power_loss_stops_advertising() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();
        lifecycle.advertising_started(Ok(()));

        lifecycle.power_changed(RadioPower::Off);
        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
        assert_eq!(lifecycle.last_error(), Some("Bluetooth is powered off"));

        lifecycle.power_changed(RadioPower::On);
        assert_eq!(lifecycle.last_error(), None);
        assert_eq!(lifecycle.status(), PeripheralStatus::Idle);
    }

    #[test]
    fn test_power_error_messages() {
        let cases = [
            (RadioPower::Off, "powered off"),
            (RadioPower::Unauthorized, "permission denied"),
            (RadioPower::Unsupported, "not supported"),
            (RadioPower::Resetting, "resetting"),
            (RadioPower::Unknown, "state unknown"),
        ];
        for (power, fragment) in cases {
            let mut lifecycle = Lifecycle::new();
            lifecycle.power_changed(power);
            assert!(lifecycle.last_error().unwrap().contains(fragment));
        }
    }

    #[test]
    fn test_service_error_keeps_state() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();
        lifecycle.service_added(Err("exists".to_string()));

        assert_eq!(lifecycle.advertising(), Advertising::Starting);
        assert_eq!(lifecycle.last_error(), Some("Failed to add service: exists"));

        lifecycle.service_added(Ok(()));
        assert_eq!(lifecycle.last_error(), Some("Failed to add service: exists"));
    }

    #[test]
    fn test_stop_clears_error() {
        let mut lifecycle = powered_on();
        lifecycle.request_start().unwrap();
        lifecycle.service_added(Err("exists".to_string()));
        lifecycle.request_stop();

        assert_eq!(lifecycle.advertising(), Advertising::Stopped);
        assert_eq!(lifecycle.last_error(), None);
    }
}
