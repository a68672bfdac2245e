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

//! System tray implementation using ksni.

use anyhow::Result;
use ksni::{
    self,
    menu::{StandardItem, SubMenu},
    Handle, MenuItem, Tray, TrayService,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::echo_log::EchoLogEntry;
use crate::lifecycle::Advertising;
use crate::session::DeviceSession;
use crate::state::{StateObserver, StateSnapshot};

/// Actions that can be triggered from the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    ToggleAdvertising,
    ClearEchoLog,
    DismissError,
    Quit,
}

pub type TrayHandle = Handle<WearableTray>;

/// System tray icon and menu.
pub struct WearableTray {
    observer: StateObserver,
    local_name: String,
    service_info: Vec<String>,
    recent_messages: usize,
    action_tx: mpsc::UnboundedSender<TrayAction>,
}

impl WearableTray {
    pub fn new(
        observer: StateObserver,
        config: &Config,
        action_tx: mpsc::UnboundedSender<TrayAction>,
    ) -> Self {
        Self {
            observer,
            local_name: config.bluetooth.local_name.clone(),
            service_info: service_info(config),
            recent_messages: config.ui.recent_messages,
            action_tx,
        }
    }

    fn action_item(label: String, action: TrayAction) -> MenuItem<Self> {
        MenuItem::Standard(StandardItem {
            label,
            activate: Box::new(move |tray: &mut Self| {
                let _ = tray.action_tx.send(action);
            }),
            ..Default::default()
        })
    }

    fn info_item(label: String) -> MenuItem<Self> {
        MenuItem::Standard(StandardItem {
            label,
            enabled: false,
            ..Default::default()
        })
    }
}

/// Static description of the simulated device.
pub fn service_info(config: &Config) -> Vec<String> {
    vec![
        format!("Device Name: {}", config.bluetooth.local_name),
        format!("Service UUID: {}", config.bluetooth.service_uuid),
        format!("Characteristic UUID: {}", config.bluetooth.characteristic_uuid),
        format!("Firmware Version: {}", config.firmware),
    ]
}

/// Label of the advertising toggle for the current state.
pub fn toggle_label(snapshot: &StateSnapshot) -> &'static str {
    match snapshot.advertising {
        Advertising::Stopped => "Start Advertising",
        Advertising::Starting | Advertising::Active => "Stop Advertising",
    }
}

/// Menu line for a connected central.
pub fn device_label(session: &DeviceSession) -> String {
    format!(
        "{} (v{}) since {}",
        session.name,
        session.version_label(),
        session.connected_at.format("%H:%M:%S")
    )
}

/// Menu line for an echo log entry.
pub fn echo_label(entry: &EchoLogEntry) -> String {
    format!(
        "[{}] {}: {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.device_name,
        entry.text
    )
}

impl Tray for WearableTray {
    fn icon_name(&self) -> String {
        self.observer.snapshot().status().icon_name().to_string()
    }

    fn title(&self) -> String {
        "Wearable Simulator".to_string()
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        let snapshot = self.observer.snapshot();
        let mut description = snapshot.status_text(&self.local_name);
        if let Some(error) = &snapshot.last_error {
            description.push('\n');
            description.push_str(error);
        }

        ksni::ToolTip {
            icon_name: String::new(),
            icon_pixmap: Vec::new(),
            title: "Wearable Simulator".to_string(),
            description,
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let snapshot = self.observer.snapshot();
        let mut items = vec![];

        // Status header
        items.push(Self::info_item(snapshot.status_text(&self.local_name)));

        if let Some(error) = &snapshot.last_error {
            items.push(Self::info_item(format!("✕ {}", error)));
            items.push(Self::action_item(
                "Dismiss Error".to_string(),
                TrayAction::DismissError,
            ));
        }

        items.push(MenuItem::Separator);

        items.push(MenuItem::Standard(StandardItem {
            label: toggle_label(&snapshot).to_string(),
            enabled: snapshot.is_powered_on(),
            activate: Box::new(|tray: &mut Self| {
                let _ = tray.action_tx.send(TrayAction::ToggleAdvertising);
            }),
            ..Default::default()
        }));

        items.push(MenuItem::Separator);

        if snapshot.sessions.is_empty() {
            items.push(Self::info_item("No devices connected".to_string()));
        } else {
            items.push(Self::info_item(format!(
                "Connected devices ({})",
                snapshot.sessions.len()
            )));
            for session in &snapshot.sessions {
                items.push(Self::info_item(device_label(session)));
            }
        }

        if !snapshot.echo_log.is_empty() {
            items.push(MenuItem::Separator);
            let skip = snapshot
                .echo_log
                .len()
                .saturating_sub(self.recent_messages);
            for entry in &snapshot.echo_log[skip..] {
                items.push(Self::info_item(echo_label(entry)));
            }
            items.push(Self::action_item(
                format!("Clear Echo Messages ({})", snapshot.echo_log.len()),
                TrayAction::ClearEchoLog,
            ));
        }

        items.push(MenuItem::Separator);

        items.push(MenuItem::SubMenu(SubMenu {
            label: "Service Information".to_string(),
            submenu: self
                .service_info
                .iter()
                .map(|line| Self::info_item(line.clone()))
                .collect(),
            ..Default::default()
        }));

        items.push(Self::action_item("Quit".to_string(), TrayAction::Quit));

        items
    }

    fn id(&self) -> String {
        "wearable-sim".to_string()
    }

    fn category(&self) -> ksni::Category {
        ksni::Category::Hardware
    }
}

/// Run the system tray service.
pub fn run_tray(
    observer: StateObserver,
    config: &Config,
) -> Result<(mpsc::UnboundedReceiver<TrayAction>, TrayHandle)> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    let tray = WearableTray::new(observer, config, action_tx);
    let service = TrayService::new(tray);
    let handle = service.handle();

    // Spawn the tray service
    std::thread::spawn(move || {
        let _ = service.run();
    });

    info!("System tray started");

    Ok((action_rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::protocol::FirmwareVersion;
    use crate::session::CentralId;

    #[test]
    fn test_toggle_label() {
        let mut snapshot = StateSnapshot::default();
        assert_eq!(toggle_label(&snapshot), "Start Advertising");
        snapshot.advertising = Advertising::Starting;
        assert_eq!(toggle_label(&snapshot), "Stop Advertising");
    }

    #[test]
    fn test_device_label() {
        let mut session = DeviceSession::with_name(CentralId::new("A"), "Phone");
        assert!(device_label(&session).starts_with("Phone (vUnknown) since "));

        session.version = Some(FirmwareVersion::new(2, 1, 9));
        assert!(device_label(&session).starts_with("Phone (v2.1.9) since "));
    }

    #[test]
    fn test_echo_label() {
        let entry = EchoLogEntry::incoming("Phone", b"hello");
        assert!(echo_label(&entry).ends_with("] Phone: hello"));
    }

    #[test]
    fn test_service_info_shows_configured_firmware() {
        let mut config = Config::default();
        config.firmware = FirmwareVersion::new(3, 4, 5);

        let lines = service_info(&config);
        assert_eq!(lines[0], "Device Name: Wearable");
        assert_eq!(
            lines[1],
            "Service UUID: 12345678-1234-5678-1234-56789abcdef0"
        );
        assert_eq!(
            lines[2],
            "Characteristic UUID: 12345678-1234-5678-1234-56789abcdef1"
        );
        assert_eq!(lines[3], "Firmware Version: 3.4.5");
    }
}
