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

//! BLE GATT server for the simulated wearable, backed by BlueZ.

use anyhow::Result;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    characteristic_control, Application, ApplicationHandle, Characteristic,
    CharacteristicControl, CharacteristicControlEvent, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest,
    Service,
};
use bluer::gatt::CharacteristicWriter;
use bluer::{Adapter, AdapterEvent, AdapterProperty};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::radio::{RadioEvent, RadioStack};
use crate::config::Config;
use crate::events::PeripheralEvent;
use crate::lifecycle::RadioPower;
use crate::session::CentralId;

type Subscribers = Arc<Mutex<HashMap<CentralId, mpsc::Sender<Vec<u8>>>>>;

/// GATT server exposing the single protocol characteristic.
pub struct GattServer {
    adapter: Adapter,
    event_tx: mpsc::Sender<PeripheralEvent>,
    characteristic_uuid: Uuid,
    notify_queue_depth: usize,
    subscribers: Subscribers,
    adv_handle: Arc<Mutex<Option<AdvertisementHandle>>>,
    app_handle: Arc<Mutex<Option<ApplicationHandle>>>,
}

impl GattServer {
    /// Open the default adapter and start reporting its power state.
    pub async fn new(event_tx: mpsc::Sender<PeripheralEvent>, config: &Config) -> Result<Self> {
        info!("Initializing BLE GATT server...");

        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if config.bluetooth.power_on_adapter && !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        let powered = adapter.is_powered().await?;
        send_event(&event_tx, RadioEvent::PowerChanged(power_of(powered))).await;

        let events = adapter.events().await?;
        let power_tx = event_tx.clone();
        tokio::spawn(async move {
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                    debug!("Adapter powered: {}", powered);
                    send_event(&power_tx, RadioEvent::PowerChanged(power_of(powered))).await;
                }
            }
            warn!("Adapter event stream ended");
        });

        Ok(Self {
            adapter,
            event_tx,
            characteristic_uuid: config.bluetooth.characteristic_uuid,
            notify_queue_depth: config.delivery.notify_queue_depth,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            adv_handle: Arc::new(Mutex::new(None)),
            app_handle: Arc::new(Mutex::new(None)),
        })
    }

    /// Build the application with one read/write/notify characteristic.
    fn build_application(
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        event_tx: mpsc::Sender<PeripheralEvent>,
    ) -> (Application, CharacteristicControl) {
        let (control, control_handle) = characteristic_control();

        let write_tx = event_tx.clone();
        let read_tx = event_tx;

        let characteristic = Characteristic {
            uuid: characteristic_uuid,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |req: CharacteristicReadRequest| {
                    let read_tx = read_tx.clone();
                    Box::pin(async move {
                        let central = CentralId::new(req.device_address.to_string());
                        send_event(&read_tx, RadioEvent::ReadReceived { central }).await;
                        Ok(Vec::new())
                    })
                }),
                ..Default::default()
            }),
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(
                    move |data: Vec<u8>, req: CharacteristicWriteRequest| {
                        let write_tx = write_tx.clone();
                        Box::pin(async move {
                            let central = CentralId::new(req.device_address.to_string());
                            debug!("Write from {}: {}", central, hex::encode(&data));
                            send_event(&write_tx, RadioEvent::WriteReceived { central, data })
                                .await;
                            Ok(())
                        })
                    },
                )),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Io,
                ..Default::default()
            }),
            control_handle,
            ..Default::default()
        };

        let service = Service {
            uuid: service_uuid,
            primary: true,
            characteristics: vec![characteristic],
            ..Default::default()
        };

        let app = Application {
            services: vec![service],
            ..Default::default()
        };

        (app, control)
    }

    /// Accept notification sessions until the application is dropped.
    async fn serve_subscriptions(
        control: CharacteristicControl,
        subscribers: Subscribers,
        event_tx: mpsc::Sender<PeripheralEvent>,
        queue_depth: usize,
    ) {
        futures::pin_mut!(control);
        while let Some(event) = control.next().await {
            match event {
                CharacteristicControlEvent::Notify(writer) => {
                    let central = CentralId::new(writer.device_address().to_string());
                    info!("Notification session opened by {} (mtu {})", central, writer.mtu());

                    let (tx, rx) = mpsc::channel(queue_depth);
                    subscribers.lock().insert(central.clone(), tx.clone());
                    send_event(
                        &event_tx,
                        RadioEvent::Subscribed {
                            central: central.clone(),
                        },
                    )
                    .await;

                    tokio::spawn(Self::pump_notifications(
                        central,
                        writer,
                        rx,
                        tx,
                        subscribers.clone(),
                        event_tx.clone(),
                    ));
                }
                _ => debug!("Ignoring characteristic control event"),
            }
        }
        debug!("Characteristic control stream ended");
    }

    /// Forward queued notifications to one central until it goes away.
    async fn pump_notifications(
        central: CentralId,
        mut writer: CharacteristicWriter,
        mut rx: mpsc::Receiver<Vec<u8>>,
        own_tx: mpsc::Sender<Vec<u8>>,
        subscribers: Subscribers,
        event_tx: mpsc::Sender<PeripheralEvent>,
    ) {
        loop {
            let data = tokio::select! {
                data = rx.recv() => match data {
                    Some(data) => data,
                    None => break,
                },
                _ = writer.closed() => break,
            };

            if let Err(e) = writer.send(&data).await {
                warn!("Notification to {} failed: {}", central, e);
                break;
            }
        }

        // A newer session for the same central replaces this one
        let removed = {
            let mut subscribers = subscribers.lock();
            match subscribers.get(&central) {
                Some(tx) if tx.same_channel(&own_tx) => subscribers.remove(&central).is_some(),
                _ => false,
            }
        };

        if removed {
            info!("Notification session closed by {}", central);
            send_event(&event_tx, RadioEvent::Unsubscribed { central }).await;
        }
    }
}

impl RadioStack for GattServer {
    fn advertise(&mut self, service_uuid: Uuid, local_name: &str) {
        let adapter = self.adapter.clone();
        let event_tx = self.event_tx.clone();
        let characteristic_uuid = self.characteristic_uuid;
        let queue_depth = self.notify_queue_depth;
        let subscribers = self.subscribers.clone();
        let adv_handle = self.adv_handle.clone();
        let app_handle = self.app_handle.clone();
        let local_name = local_name.to_string();

        tokio::spawn(async move {
            // Replace any previous registration
            app_handle.lock().take();

            let (app, control) =
                Self::build_application(service_uuid, characteristic_uuid, event_tx.clone());

            match adapter.serve_gatt_application(app).await {
                Ok(handle) => {
                    info!("GATT service registered");
                    *app_handle.lock() = Some(handle);
                    tokio::spawn(Self::serve_subscriptions(
                        control,
                        subscribers,
                        event_tx.clone(),
                        queue_depth,
                    ));
                    send_event(&event_tx, RadioEvent::ServiceAdded(Ok(()))).await;
                }
                Err(e) => {
                    error!("Failed to register GATT service: {}", e);
                    send_event(&event_tx, RadioEvent::ServiceAdded(Err(e.to_string()))).await;
                }
            }

            let adv = Advertisement {
                service_uuids: vec![service_uuid].into_iter().collect(),
                discoverable: Some(true),
                local_name: Some(local_name),
                ..Default::default()
            };

            match adapter.advertise(adv).await {
                Ok(handle) => {
                    info!("BLE advertising started");
                    *adv_handle.lock() = Some(handle);
                    send_event(&event_tx, RadioEvent::AdvertisingStarted(Ok(()))).await;
                }
                Err(e) => {
                    error!("Failed to start advertising: {}", e);
                    send_event(&event_tx, RadioEvent::AdvertisingStarted(Err(e.to_string())))
                        .await;
                }
            }
        });
    }

    fn stop_advertising(&mut self) {
        if self.adv_handle.lock().take().is_some() {
            info!("BLE advertising stopped");
        }
    }

    fn notify(&self, _characteristic: Uuid, payload: &[u8], recipients: &[CentralId]) -> bool {
        queue_notification(&self.subscribers.lock(), payload, recipients)
    }
}

/// Queue `payload` for every subscribed recipient, or for none of them.
///
/// Room is reserved in each queue first, so a rejection never leaves some
/// recipients with a copy that the retry would send again.
fn queue_notification(
    subscribers: &HashMap<CentralId, mpsc::Sender<Vec<u8>>>,
    payload: &[u8],
    recipients: &[CentralId],
) -> bool {
    let mut permits = Vec::with_capacity(recipients.len());
    for central in recipients {
        let Some(tx) = subscribers.get(central) else {
            debug!("{} is not subscribed, skipping", central);
            continue;
        };
        match tx.try_reserve() {
            Ok(permit) => permits.push(permit),
            Err(e) => {
                debug!("Notify queue for {} unavailable: {}", central, e);
                return false;
            }
        }
    }

    for permit in permits {
        permit.send(payload.to_vec());
    }
    true
}

fn power_of(powered: bool) -> RadioPower {
    if powered {
        RadioPower::On
    } else {
        RadioPower::Off
    }
}

async fn send_event(event_tx: &mpsc::Sender<PeripheralEvent>, event: RadioEvent) {
    if event_tx.send(event.into()).await.is_err() {
        error!("Event queue closed, radio event dropped");
    }
}
