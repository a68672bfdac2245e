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

//! BLE service and characteristic UUIDs for the simulated wearable.

use uuid::Uuid;

use super::protocol::FirmwareVersion;

/// Wearable GATT service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);

/// Protocol characteristic UUID.
/// Properties: Read, Write, Write Without Response, Notify
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// Name placed in the advertisement.
pub const DEFAULT_LOCAL_NAME: &str = "Wearable";

/// Firmware version reported when the config does not override it.
pub const DEFAULT_FIRMWARE_VERSION: FirmwareVersion = FirmwareVersion::new(2, 1, 9);

/// Delivery constants.
pub mod delivery {
    /// Delay before the single retry of a rejected notification.
    pub const RETRY_DELAY_MS: u64 = 100;

    /// Outbound notifications queued per subscriber before `notify` rejects.
    pub const NOTIFY_QUEUE_DEPTH: usize = 8;

    /// Capacity of the core event queue.
    pub const EVENT_QUEUE_CAPACITY: usize = 64;
}

/// Longest local name that fits a legacy scan response (31 bytes minus the
/// AD length and type bytes).
pub const MAX_LOCAL_NAME_LEN: usize = 29;
