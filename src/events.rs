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

//! Event processing and message dispatch.
//!
//! Radio callbacks, user commands and delivery retries all arrive on one
//! queue and are handled here one at a time. Each handled event ends with a
//! state publication.

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bluetooth::protocol::{FirmwareVersion, Message};
use crate::bluetooth::{RadioEvent, RadioStack};
use crate::config::Config;
use crate::delivery::{DeliveryOutcome, NotificationDelivery, PendingNotification};
use crate::echo_log::{EchoLog, EchoLogEntry};
use crate::lifecycle::{Advertising, AdvertisingOutcome, Lifecycle};
use crate::session::{CentralId, DeviceSession, SessionRegistry};
use crate::state::{StateObserver, StatePublisher, StateSnapshot};

/// Commands from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    ToggleAdvertising,
    ClearEchoLog,
    DismissError,
}

/// Everything the core reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    Radio(RadioEvent),
    Command(UserCommand),
    RetryNotification(PendingNotification),
}

impl From<RadioEvent> for PeripheralEvent {
    fn from(event: RadioEvent) -> Self {
        PeripheralEvent::Radio(event)
    }
}

impl From<UserCommand> for PeripheralEvent {
    fn from(command: UserCommand) -> Self {
        PeripheralEvent::Command(command)
    }
}

/// Owns all peripheral state and drives it from the event queue.
pub struct EventProcessor<R: RadioStack> {
    radio: R,
    lifecycle: Lifecycle,
    sessions: SessionRegistry,
    echo_log: EchoLog,
    delivery: NotificationDelivery,
    publisher: StatePublisher,
    firmware: FirmwareVersion,
    service_uuid: Uuid,
    local_name: String,
}

impl<R: RadioStack> EventProcessor<R> {
    /// Create a new event processor.
    ///
    /// `event_tx` must feed the queue this processor drains; delivery
    /// retries are posted to it. Only a weak handle is kept.
    pub fn new(
        radio: R,
        config: &Config,
        event_tx: &mpsc::Sender<PeripheralEvent>,
        publisher: StatePublisher,
    ) -> Self {
        let delivery = NotificationDelivery::new(
            config.bluetooth.characteristic_uuid,
            config.delivery.retry_delay(),
            event_tx,
        );

        Self {
            radio,
            lifecycle: Lifecycle::new(),
            sessions: SessionRegistry::new(),
            echo_log: EchoLog::new(),
            delivery,
            publisher,
            firmware: config.firmware,
            service_uuid: config.bluetooth.service_uuid,
            local_name: config.bluetooth.local_name.clone(),
        }
    }

    /// Drain the queue until every sender is gone. Pending retries do not
    /// keep the queue open.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PeripheralEvent>) {
        info!("Event processor started");
        while let Some(event) = event_rx.recv().await {
            self.process_event(event);
        }
        info!("Event processor stopped");
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::Radio(event) => self.handle_radio_event(event),
            PeripheralEvent::Command(command) => self.handle_command(command),
            PeripheralEvent::RetryNotification(pending) => {
                self.delivery.retry(&self.radio, &pending);
            }
        }
        self.publish();
    }

    /// Current state, as observers would see it.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            power: self.lifecycle.power(),
            advertising: self.lifecycle.advertising(),
            last_error: self.lifecycle.last_error().map(str::to_string),
            sessions: self.sessions.list().to_vec(),
            echo_log: self.echo_log.entries().to_vec(),
        }
    }

    fn publish(&self) {
        self.publisher.publish(self.snapshot());
    }

    fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::PowerChanged(power) => {
                let was_advertising = self.lifecycle.advertising() != Advertising::Stopped;
                self.lifecycle.power_changed(power);
                // BlueZ keeps registered advertisements across a power cycle
                if was_advertising && self.lifecycle.advertising() == Advertising::Stopped {
                    self.radio.stop_advertising();
                }
            }
            RadioEvent::WriteReceived { central, data } => {
                self.handle_write(central, &data);
            }
            RadioEvent::ReadReceived { central } => {
                debug!("Read from {} answered with empty value", central);
            }
            RadioEvent::Subscribed { central } => {
                info!("Central subscribed: {}", central);
                self.sessions.add(DeviceSession::new(central));
            }
            RadioEvent::Unsubscribed { central } => {
                info!("Central unsubscribed: {}", central);
                self.sessions.remove(&central);
                // The log is shared by all centrals
                let cleared = self.echo_log.clear();
                debug!("Cleared {} echo log entries", cleared);
            }
            RadioEvent::ServiceAdded(result) => {
                self.lifecycle.service_added(result);
            }
            RadioEvent::AdvertisingStarted(result) => {
                if self.lifecycle.advertising_started(result) == AdvertisingOutcome::Stale {
                    self.radio.stop_advertising();
                }
            }
        }
    }

    fn handle_command(&mut self, command: UserCommand) {
        debug!("User command: {:?}", command);
        match command {
            UserCommand::ToggleAdvertising => match self.lifecycle.advertising() {
                Advertising::Stopped => self.start_advertising(),
                Advertising::Starting | Advertising::Active => self.stop_advertising(),
            },
            UserCommand::ClearEchoLog => {
                let cleared = self.echo_log.clear();
                info!("Echo log cleared ({} entries)", cleared);
            }
            UserCommand::DismissError => self.lifecycle.dismiss_error(),
        }
    }

    /// Request advertising if the lifecycle allows it.
    pub fn start_advertising(&mut self) {
        if self.lifecycle.request_start().is_ok() {
            info!("Advertising as '{}'", self.local_name);
            self.radio.advertise(self.service_uuid, &self.local_name);
        }
    }

    /// Stop advertising without waiting for confirmation.
    pub fn stop_advertising(&mut self) {
        self.lifecycle.request_stop();
        self.radio.stop_advertising();
        info!("Advertising stopped");
    }

    fn handle_write(&mut self, central: CentralId, data: &[u8]) {
        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping frame from {} ({}): {}", central, e, hex::encode(data));
                return;
            }
        };

        debug!("{} from {}", message.kind(), central);
        let recipients = [central];

        let outcome = match message {
            Message::VersionRequest => {
                // Record what is sent, whether or not it gets through
                self.sessions.update_version(&recipients[0], self.firmware);
                let response = Message::VersionResponse(self.firmware);
                self.delivery.deliver(&self.radio, &response, &recipients)
            }
            Message::EchoRequest(payload) => {
                let name = self.sessions.display_name(&recipients[0]);
                let entry = EchoLogEntry::incoming(name, &payload);
                info!("Echo from {}: {}", entry.device_name, entry.text);
                self.echo_log.push(entry);

                let response = Message::EchoResponse(payload);
                self.delivery.deliver(&self.radio, &response, &recipients)
            }
            response => {
                debug!("Ignoring {} sent by {}", response.kind(), recipients[0]);
                return;
            }
        };

        if outcome == DeliveryOutcome::RetryScheduled {
            debug!("Response to {} queued for retry", recipients[0]);
        }
    }
}

/// Start advertising once the adapter reports power, unless advertising
/// was already requested by then.
pub async fn advertise_when_powered(
    mut observer: StateObserver,
    event_tx: mpsc::Sender<PeripheralEvent>,
) {
    while !observer.snapshot().is_powered_on() {
        if observer.changed().await.is_none() {
            return;
        }
    }

    if observer.snapshot().advertising != Advertising::Stopped {
        debug!("Advertising already requested, skipping auto-start");
        return;
    }

    if event_tx
        .send(UserCommand::ToggleAdvertising.into())
        .await
        .is_err()
    {
        error!("Event queue closed before advertising could start");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RadioPower;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Advertise(Uuid, String),
        StopAdvertising,
        Notify(Vec<u8>, Vec<CentralId>),
    }

    struct RecordingRadio {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RadioStack for RecordingRadio {
        fn advertise(&mut self, service_uuid: Uuid, local_name: &str) {
            self.calls
                .lock()
                .push(Call::Advertise(service_uuid, local_name.to_string()));
        }

        fn stop_advertising(&mut self) {
            self.calls.lock().push(Call::StopAdvertising);
        }

        fn notify(&self, _characteristic: Uuid, payload: &[u8], recipients: &[CentralId]) -> bool {
            self.calls
                .lock()
                .push(Call::Notify(payload.to_vec(), recipients.to_vec()));
            true
        }
    }

    fn processor() -> (EventProcessor<RecordingRadio>, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = mpsc::channel(8);
        let (publisher, _observer) = StatePublisher::new();
        let radio = RecordingRadio {
            calls: calls.clone(),
        };
        (
            EventProcessor::new(radio, &Config::default(), &tx, publisher),
            calls,
        )
    }

    fn central(s: &str) -> CentralId {
        CentralId::new(s)
    }

    #[tokio::test]
    async fn test_toggle_requires_power() {
        let (mut processor, calls) = processor();
        processor.process_event(UserCommand::ToggleAdvertising.into());

        let snapshot = processor.snapshot();
        assert_eq!(snapshot.advertising, Advertising::Stopped);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("Bluetooth is not powered on")
        );
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_starts_and_stops() {
        let (mut processor, calls) = processor();
        processor.process_event(RadioEvent::PowerChanged(RadioPower::On).into());
        processor.process_event(UserCommand::ToggleAdvertising.into());
        assert_eq!(processor.snapshot().advertising, Advertising::Starting);

        processor.process_event(UserCommand::ToggleAdvertising.into());
        assert_eq!(processor.snapshot().advertising, Advertising::Stopped);

        let calls = calls.lock();
        assert_eq!(
            *calls,
            vec![
                Call::Advertise(
                    crate::bluetooth::ble_constants::SERVICE_UUID,
                    "Wearable".to_string()
                ),
                Call::StopAdvertising,
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_advertising_report_stops_radio() {
        let (mut processor, calls) = processor();
        processor.process_event(RadioEvent::PowerChanged(RadioPower::On).into());
        processor.process_event(UserCommand::ToggleAdvertising.into());
        processor.process_event(UserCommand::ToggleAdvertising.into());
        processor.process_event(RadioEvent::AdvertisingStarted(Ok(())).into());

        assert_eq!(processor.snapshot().advertising, Advertising::Stopped);
        assert_eq!(calls.lock().last(), Some(&Call::StopAdvertising));
    }

    #[tokio::test]
    async fn test_malformed_write_is_dropped() {
        let (mut processor, calls) = processor();
        processor.process_event(RadioEvent::Subscribed { central: central("A") }.into());
        processor.process_event(
            RadioEvent::WriteReceived {
                central: central("A"),
                data: vec![0x01, 0x09, b'x'],
            }
            .into(),
        );

        assert!(calls.lock().is_empty());
        assert!(processor.snapshot().echo_log.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_response_ignored() {
        let (mut processor, calls) = processor();
        processor.process_event(
            RadioEvent::WriteReceived {
                central: central("A"),
                data: vec![0x81, 0x01, b'x'],
            }
            .into(),
        );
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_echo_from_unknown_central_uses_identity() {
        let (mut processor, calls) = processor();
        processor.process_event(
            RadioEvent::WriteReceived {
                central: central("AA:BB"),
                data: vec![0x01, 0x02, b'h', b'i'],
            }
            .into(),
        );

        let snapshot = processor.snapshot();
        assert_eq!(snapshot.echo_log.len(), 1);
        assert_eq!(snapshot.echo_log[0].device_name, "AA:BB");
        assert_eq!(
            calls.lock()[0],
            Call::Notify(vec![0x81, 0x02, b'h', b'i'], vec![central("AA:BB")])
        );
    }

    #[tokio::test]
    async fn test_clear_and_dismiss_commands() {
        let (mut processor, _calls) = processor();
        processor.process_event(
            RadioEvent::WriteReceived {
                central: central("A"),
                data: vec![0x01, 0x00],
            }
            .into(),
        );
        processor.process_event(RadioEvent::PowerChanged(RadioPower::Off).into());
        assert_eq!(processor.snapshot().echo_log.len(), 1);
        assert!(processor.snapshot().last_error.is_some());

        processor.process_event(UserCommand::ClearEchoLog.into());
        processor.process_event(UserCommand::DismissError.into());

        let snapshot = processor.snapshot();
        assert!(snapshot.echo_log.is_empty());
        assert_eq!(snapshot.last_error, None);
    }

    #[tokio::test]
    async fn test_auto_start_waits_for_power() {
        let (publisher, observer) = StatePublisher::new();
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(advertise_when_powered(observer, tx));

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        publisher.publish(StateSnapshot {
            power: RadioPower::On,
            ..Default::default()
        });
        task.await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(PeripheralEvent::Command(UserCommand::ToggleAdvertising))
        );
    }

    #[tokio::test]
    async fn test_auto_start_keeps_user_request() {
        let (publisher, observer) = StatePublisher::new();
        let (tx, mut rx) = mpsc::channel(8);

        publisher.publish(StateSnapshot {
            power: RadioPower::On,
            advertising: Advertising::Starting,
            ..Default::default()
        });
        advertise_when_powered(observer, tx).await;

        // The sender is gone and nothing was queued
        assert_eq!(rx.recv().await, None);
    }
}
