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

//! Wearable simulator: a BLE peripheral that answers version and echo
//! requests.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wearable_sim::bluetooth::GattServer;
use wearable_sim::config::Config;
use wearable_sim::events::{advertise_when_powered, EventProcessor, PeripheralEvent, UserCommand};
use wearable_sim::state::{StateObserver, StatePublisher};
use wearable_sim::ui::{self, TrayAction, TrayHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wearable_sim=info".parse()?),
        )
        .init();

    info!("Starting Wearable Simulator v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded: '{}' firmware {}",
        config.bluetooth.local_name, config.firmware
    );

    let (event_tx, event_rx) =
        mpsc::channel::<PeripheralEvent>(config.delivery.event_queue_capacity);
    let (publisher, observer) = StatePublisher::new();

    // Initialize BLE GATT server
    let gatt_server = GattServer::new(event_tx.clone(), &config).await?;

    let processor = EventProcessor::new(gatt_server, &config, &event_tx, publisher);
    tokio::spawn(processor.run(event_rx));

    if config.bluetooth.advertise_on_start {
        tokio::spawn(advertise_when_powered(observer.clone(), event_tx.clone()));
    }

    // Start system tray
    let mut action_rx = if config.ui.show_tray {
        let (action_rx, handle) = ui::run_tray(observer.clone(), &config)?;
        tokio::spawn(refresh_tray(
            observer.clone(),
            handle,
            config.bluetooth.local_name.clone(),
        ));
        Some(action_rx)
    } else {
        None
    };

    info!(
        "Ready. {}",
        observer.snapshot().status_text(&config.bluetooth.local_name)
    );

    // Handle tray actions
    loop {
        tokio::select! {
            Some(action) = next_action(&mut action_rx) => {
                let command = match action {
                    TrayAction::ToggleAdvertising => UserCommand::ToggleAdvertising,
                    TrayAction::ClearEchoLog => UserCommand::ClearEchoLog,
                    TrayAction::DismissError => UserCommand::DismissError,
                    TrayAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                };
                event_tx.send(command.into()).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Wearable Simulator stopped");
    Ok(())
}

/// Redraw the tray whenever the published state changes.
async fn refresh_tray(mut observer: StateObserver, handle: TrayHandle, local_name: String) {
    while let Some(snapshot) = observer.changed().await {
        debug!("State changed: {}", snapshot.status_text(&local_name));
        handle.update(|_| {});
    }
}

async fn next_action(
    action_rx: &mut Option<mpsc::UnboundedReceiver<TrayAction>>,
) -> Option<TrayAction> {
    match action_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
