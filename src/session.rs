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

//! Registry of subscribed centrals.

use chrono::{DateTime, Local};
use std::fmt;
use tracing::debug;

use crate::bluetooth::protocol::FirmwareVersion;

/// Transport identity of a central.
///
/// On BlueZ this is the remote device address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CentralId(String);

impl CentralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CentralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subscribed central.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    pub id: CentralId,
    pub name: String,
    /// Set once a version exchange has happened.
    pub version: Option<FirmwareVersion>,
    pub connected_at: DateTime<Local>,
}

impl DeviceSession {
    /// New session named after its transport identity.
    pub fn new(id: CentralId) -> Self {
        let name = id.to_string();
        Self::with_name(id, name)
    }

    pub fn with_name(id: CentralId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            version: None,
            connected_at: Local::now(),
        }
    }

    /// Version for display, "Unknown" before any exchange.
    pub fn version_label(&self) -> String {
        self.version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Insertion-ordered table of sessions, at most one per central.
#[derive(Debug, Default, Clone)]
pub struct SessionRegistry {
    sessions: Vec<DeviceSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns false if the central already has one; the
    /// existing entry is kept untouched.
    pub fn add(&mut self, session: DeviceSession) -> bool {
        if self.get(&session.id).is_some() {
            debug!("Session for {} already registered", session.id);
            return false;
        }
        self.sessions.push(session);
        true
    }

    /// Remove the session for a central, if any.
    pub fn remove(&mut self, id: &CentralId) -> Option<DeviceSession> {
        let index = self.sessions.iter().position(|s| &s.id == id)?;
        Some(self.sessions.remove(index))
    }

    /// Record the version exchanged with a central. Position is preserved.
    pub fn update_version(&mut self, id: &CentralId, version: FirmwareVersion) -> bool {
        match self.sessions.iter_mut().find(|s| &s.id == id) {
            Some(session) => {
                session.version = Some(version);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &CentralId) -> Option<&DeviceSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    /// Best-known name for a central: its session name, else its identity.
    pub fn display_name(&self, id: &CentralId) -> String {
        self.get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn list(&self) -> &[DeviceSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
