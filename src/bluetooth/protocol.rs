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

//! Message protocol definitions and binary encoding.
//!
//! Every frame on the characteristic is `[tag][length][payload]`, where the
//! length is a single byte. Response tags have the high bit set.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Frame header size (tag + length).
pub const HEADER_LEN: usize = 2;

/// Largest payload a single-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Message tags.
pub mod tag {
    pub const VERSION_REQUEST: u8 = 0x00;
    pub const ECHO_REQUEST: u8 = 0x01;
    pub const VERSION_RESPONSE: u8 = 0x80;
    pub const ECHO_RESPONSE: u8 = 0x81;

    /// Bit set on every response tag.
    pub const RESPONSE_BIT: u8 = 0x80;
}

/// Firmware version reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Wire representation.
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }

    /// Parse from exactly three bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [major, minor, patch] => Some(Self::new(*major, *minor, *patch)),
            _ => None,
        }
    }

    /// 0.0.0 is reserved to mean "no version".
    pub fn is_unset(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Why an inbound frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("unknown message tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("length field says {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("version response carries the reserved 0.0.0 version")]
    ZeroVersion,
}

/// Protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    VersionRequest,
    VersionResponse(FirmwareVersion),
    EchoRequest(Vec<u8>),
    EchoResponse(Vec<u8>),
}

impl Message {
    /// Wire tag for this message.
    pub fn tag(&self) -> u8 {
        match self {
            Self::VersionRequest => tag::VERSION_REQUEST,
            Self::VersionResponse(_) => tag::VERSION_RESPONSE,
            Self::EchoRequest(_) => tag::ECHO_REQUEST,
            Self::EchoResponse(_) => tag::ECHO_RESPONSE,
        }
    }

    pub fn is_response(&self) -> bool {
        self.tag() & tag::RESPONSE_BIT != 0
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VersionRequest => "VERSION_REQ",
            Self::VersionResponse(_) => "VERSION_RSP",
            Self::EchoRequest(_) => "ECHO_REQ",
            Self::EchoResponse(_) => "ECHO_RSP",
        }
    }

    /// Build the echo response for an echo request.
    pub fn echo_reply(&self) -> Option<Message> {
        match self {
            Self::EchoRequest(payload) => Some(Self::EchoResponse(payload.clone())),
            _ => None,
        }
    }

    /// Serialize to `[tag][length][payload]`.
    ///
    /// # Panics
    ///
    /// Panics if the payload is longer than [`MAX_PAYLOAD_LEN`]. Callers own
    /// that limit; inbound payloads can never exceed it.
    pub fn encode(&self) -> Vec<u8> {
        let version_bytes;
        let payload: &[u8] = match self {
            Self::VersionRequest => &[],
            Self::VersionResponse(version) => {
                version_bytes = version.to_bytes();
                &version_bytes
            }
            Self::EchoRequest(payload) | Self::EchoResponse(payload) => payload,
        };

        assert!(
            payload.len() <= MAX_PAYLOAD_LEN,
            "{} payload of {} bytes exceeds the {} byte frame limit",
            self.kind(),
            payload.len(),
            MAX_PAYLOAD_LEN
        );

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.push(self.tag());
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame
    }

    /// Parse a complete frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TooShort(bytes.len()));
        }

        let declared = bytes[1] as usize;
        let payload = &bytes[HEADER_LEN..];
        let mismatch = DecodeError::LengthMismatch {
            declared,
            actual: payload.len(),
        };

        match bytes[0] {
            tag::VERSION_REQUEST => {
                if declared != 0 || !payload.is_empty() {
                    return Err(mismatch);
                }
                Ok(Self::VersionRequest)
            }
            tag::VERSION_RESPONSE => {
                if declared != 3 {
                    return Err(mismatch);
                }
                let version = FirmwareVersion::from_bytes(payload).ok_or(mismatch)?;
                if version.is_unset() {
                    return Err(DecodeError::ZeroVersion);
                }
                Ok(Self::VersionResponse(version))
            }
            tag::ECHO_REQUEST if payload.len() == declared => {
                Ok(Self::EchoRequest(payload.to_vec()))
            }
            tag::ECHO_RESPONSE if payload.len() == declared => {
                Ok(Self::EchoResponse(payload.to_vec()))
            }
            tag::ECHO_REQUEST | tag::ECHO_RESPONSE => Err(mismatch),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}
