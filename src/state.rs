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

//! Published peripheral state.
//!
//! The event processor is the only writer. Observers get owned snapshots
//! and can wait for the next change.

use tokio::sync::watch;

use crate::echo_log::EchoLogEntry;
use crate::lifecycle::{Advertising, PeripheralStatus, RadioPower};
use crate::session::DeviceSession;

/// Everything the presentation layer can see.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub power: RadioPower,
    pub advertising: Advertising,
    pub last_error: Option<String>,
    pub sessions: Vec<DeviceSession>,
    pub echo_log: Vec<EchoLogEntry>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            power: RadioPower::Unknown,
            advertising: Advertising::Stopped,
            last_error: None,
            sessions: Vec::new(),
            echo_log: Vec::new(),
        }
    }
}

impl StateSnapshot {
    pub fn is_powered_on(&self) -> bool {
        self.power == RadioPower::On
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising == Advertising::Active
    }

    pub fn status(&self) -> PeripheralStatus {
        PeripheralStatus::of(self.power, self.advertising)
    }

    /// One-line status for the given advertised name.
    pub fn status_text(&self, local_name: &str) -> String {
        match self.status() {
            PeripheralStatus::Advertising => format!(
                "Advertising as '{}' - {} device(s) connected",
                local_name,
                self.sessions.len()
            ),
            PeripheralStatus::Idle if self.advertising == Advertising::Starting => {
                "Starting advertising...".to_string()
            }
            status => status.as_str().to_string(),
        }
    }
}

/// Write side, owned by the event processor.
#[derive(Debug)]
pub struct StatePublisher {
    tx: watch::Sender<StateSnapshot>,
}

impl StatePublisher {
    pub fn new() -> (Self, StateObserver) {
        let (tx, rx) = watch::channel(StateSnapshot::default());
        (Self { tx }, StateObserver { rx })
    }

    /// Replace the published state. Observers are woken only on change.
    pub fn publish(&self, snapshot: StateSnapshot) {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub fn subscribe(&self) -> StateObserver {
        StateObserver {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side handed to observers.
#[derive(Debug, Clone)]
pub struct StateObserver {
    rx: watch::Receiver<StateSnapshot>,
}

impl StateObserver {
    /// Copy of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<StateSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
