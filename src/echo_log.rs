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

//! In-memory log of echo traffic.

use chrono::{DateTime, Local};

/// Placeholder recorded when an echo payload is not UTF-8.
pub const INVALID_TEXT: &str = "Invalid message";

/// Direction of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "IN",
            Direction::Outgoing => "OUT",
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoLogEntry {
    pub device_name: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
}

impl EchoLogEntry {
    pub fn incoming(device_name: impl Into<String>, payload: &[u8]) -> Self {
        Self::new(device_name, payload, Direction::Incoming)
    }

    pub fn new(device_name: impl Into<String>, payload: &[u8], direction: Direction) -> Self {
        let text = std::str::from_utf8(payload)
            .map(str::to_string)
            .unwrap_or_else(|_| INVALID_TEXT.to_string());

        Self {
            device_name: device_name.into(),
            text,
            timestamp: Local::now(),
            direction,
        }
    }
}

/// Append-only log, kept in arrival order.
#[derive(Debug, Default, Clone)]
pub struct EchoLog {
    entries: Vec<EchoLogEntry>,
}

impl EchoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: EchoLogEntry) {
        self.entries.push(entry);
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn entries(&self) -> &[EchoLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_basic() {
        let mut log = EchoLog::new();
        log.push(EchoLogEntry::incoming("Phone", b"first"));
        log.push(EchoLogEntry::incoming("Watch", b"second"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].text, "first");
        assert_eq!(log.entries()[1].device_name, "Watch");
        assert_eq!(log.entries()[1].direction, Direction::Incoming);

        assert_eq!(log.clear(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        let entry = EchoLogEntry::incoming("Phone", &[0xFF, 0xFE]);
        assert_eq!(entry.text, INVALID_TEXT);
    }
}
