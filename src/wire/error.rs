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

//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors raised while decoding or encoding protocol primitives.
///
/// A `WireError` always concerns a single message. Handlers drop the
/// offending message and keep the transport alive; only I/O failures
/// tear a transport down.
#[derive(Debug, Error)]
pub enum WireError {
    /// A decode ran past the end of the message payload.
    #[error("payload truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the decoder required.
        needed: usize,
        /// Bytes actually left in the payload.
        remaining: usize,
    },

    /// The null size marker (0xFF) appeared where a concrete length is required.
    #[error("null size marker where a length is required")]
    NullSize,

    /// A wire string was not valid UTF-8.
    #[error("invalid utf-8 in wire string")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A status object carried an unrecognized type byte.
    #[error("unknown status type byte 0x{value:02x}")]
    UnknownStatusType {
        /// The raw type byte.
        value: u8,
    },

    /// An externally supplied value codec rejected its payload.
    #[error("value codec failed: {reason}")]
    Value {
        /// Codec-provided description of the failure.
        reason: String,
    },
}

impl WireError {
    /// Creates a [`WireError::Value`] from any displayable reason.
    ///
    /// Intended for [`ValueCodec`](crate::wire::ValueCodec) implementations
    /// outside this crate.
    pub fn value(reason: impl Into<String>) -> Self {
        Self::Value {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let error = WireError::Truncated {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            error.to_string(),
            "payload truncated: needed 4 more bytes, 1 remaining"
        );
    }

    #[test]
    fn test_value_constructor() {
        let error = WireError::value("bad field descriptor");
        assert!(error.to_string().contains("bad field descriptor"));
    }
}

// Made with Bob
