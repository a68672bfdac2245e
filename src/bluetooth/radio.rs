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

//! Boundary between the peripheral core and the platform radio stack.

use uuid::Uuid;

use crate::lifecycle::RadioPower;
use crate::session::CentralId;

/// Events raised by the radio stack.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// Adapter power state changed.
    PowerChanged(RadioPower),
    /// A central wrote to the characteristic.
    WriteReceived { central: CentralId, data: Vec<u8> },
    /// A central read the characteristic (already answered with an empty value).
    ReadReceived { central: CentralId },
    /// A central enabled notifications.
    Subscribed { central: CentralId },
    /// A central disabled notifications or went away.
    Unsubscribed { central: CentralId },
    /// Result of registering the GATT service.
    ServiceAdded(Result<(), String>),
    /// Result of starting the advertisement.
    AdvertisingStarted(Result<(), String>),
}

/// Operations the core needs from the radio stack.
///
/// Every call returns immediately. Results of `advertise` come back later
/// as [`RadioEvent::ServiceAdded`] and [`RadioEvent::AdvertisingStarted`].
pub trait RadioStack: Send {
    /// Register the service and start advertising it under `local_name`.
    fn advertise(&mut self, service_uuid: Uuid, local_name: &str);

    /// Stop advertising. No confirmation is reported.
    fn stop_advertising(&mut self);

    /// Queue a notification to the given centrals.
    ///
    /// Returns false when an outbound queue could not take it. A rejection
    /// means no recipient was sent the payload.
    fn notify(&self, characteristic: Uuid, payload: &[u8], recipients: &[CentralId]) -> bool;
}
