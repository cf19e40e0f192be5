//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Protocol status objects.
//!
//! A status travels at the end of validation and channel-lifecycle
//! responses. The overwhelmingly common OK case is a single 0xFF byte;
//! everything else carries a severity, a message, and the server's call
//! tree for diagnostics.

use crate::wire::codec::put_string;
use crate::wire::cursor::PayloadCursor;
use crate::wire::error::WireError;
use bytes::BufMut;
use std::fmt;

/// Single-byte encoding of an OK status with no message.
const STATUS_OK_FAST: u8 = 0xFF;

/// Severity of a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    /// Success.
    Ok,
    /// Success with a caveat worth reporting.
    Warning,
    /// The operation failed.
    Error,
    /// The operation failed and the connection state is suspect.
    Fatal,
}

impl StatusType {
    /// Maps a wire byte to a severity.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Warning),
            2 => Some(Self::Error),
            3 => Some(Self::Fatal),
            _ => None,
        }
    }

    /// The wire byte for this severity.
    pub fn raw(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Fatal => 3,
        }
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        write!(f, "{name}")
    }
}

/// Outcome report attached to validation and channel responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Severity of the outcome.
    pub status_type: StatusType,
    /// Human-readable description, empty on success.
    pub message: String,
    /// Server-side call tree for diagnostics, usually empty.
    pub call_tree: String,
}

impl Status {
    /// A plain OK status.
    pub fn ok() -> Self {
        Self {
            status_type: StatusType::Ok,
            message: String::new(),
            call_tree: String::new(),
        }
    }

    /// An error status with a message and no call tree.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status_type: StatusType::Error,
            message: message.into(),
            call_tree: String::new(),
        }
    }

    /// Whether the operation succeeded. Warnings count as success.
    pub fn is_success(&self) -> bool {
        matches!(self.status_type, StatusType::Ok | StatusType::Warning)
    }

    /// Encodes this status, using the one-byte fast path when possible.
    pub fn encode(&self, buf: &mut impl BufMut) {
        if self.status_type == StatusType::Ok && self.message.is_empty() && self.call_tree.is_empty()
        {
            buf.put_u8(STATUS_OK_FAST);
            return;
        }
        buf.put_u8(self.status_type.raw());
        put_string(buf, &self.message);
        put_string(buf, &self.call_tree);
    }

    /// Decodes a status from the cursor.
    ///
    /// # Errors
    ///
    /// [`WireError::UnknownStatusType`] for an unrecognized type byte,
    /// or any string decode failure.
    pub fn decode(cursor: &mut PayloadCursor<'_>) -> Result<Self, WireError> {
        let raw = cursor.read_u8()?;
        if raw == STATUS_OK_FAST {
            return Ok(Self::ok());
        }
        let status_type =
            StatusType::from_raw(raw).ok_or(WireError::UnknownStatusType { value: raw })?;
        let message = cursor.read_string()?.to_owned();
        let call_tree = cursor.read_string()?.to_owned();
        Ok(Self {
            status_type,
            message,
            call_tree,
        })
    }

    /// Decodes a status, treating an already-empty payload as OK.
    ///
    /// Some servers omit the trailing status entirely on success.
    pub fn decode_or_ok(cursor: &mut PayloadCursor<'_>) -> Result<Self, WireError> {
        if cursor.remaining() == 0 {
            return Ok(Self::ok());
        }
        Self::decode(cursor)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status_type)
        } else {
            write!(f, "{}: {}", self.status_type, self.message)
        }
    }
}
