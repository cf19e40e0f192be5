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

//! Top-level error types.
//!
//! Failures are layered the way the stack is:
//!
//! 1. **Wire**: a payload that cannot be decoded ([`WireError`])
//! 2. **Transport**: a socket that cannot be used ([`TransportError`])
//! 3. **Protocol**: a well-formed exchange that went wrong
//!    ([`ProtocolError`])
//!
//! [`ClientError`] composes the layers into the one error type public
//! operations return. Each layer keeps its own handling strategy: wire
//! errors drop the offending message, transport errors close the
//! connection and put its channels back into search, protocol errors are
//! reported per operation.
//!
//! ```rust
//! use cdap::error::ClientError;
//! use cdap::transport::TransportError;
//!
//! let error: ClientError = TransportError::Closed.into();
//! assert!(error.is_transport_error());
//! assert!(!error.is_recoverable());
//! ```

use crate::client::{ChannelId, ChannelState};
use crate::transport::TransportError;
use crate::wire::{Status, WireError};
use thiserror::Error;

/// A well-formed protocol exchange that ended badly.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payload did not decode as its command requires.
    #[error("malformed payload: {0}")]
    Malformed(#[from] WireError),

    /// The server rejected the connection-validation handshake.
    #[error("connection validation rejected: {status}")]
    ValidationFailed {
        /// The rejection status sent by the server.
        status: Status,
    },

    /// A command arrived over a transport kind it is not defined for.
    #[error("{command} received over the wrong transport kind")]
    UnexpectedOrigin {
        /// Name of the offending command.
        command: &'static str,
    },
}

/// Top-level error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A payload could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A socket could not be used.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A protocol exchange failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The configuration is inconsistent.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// A channel name was rejected at creation.
    #[error("invalid channel name: {reason}")]
    InvalidName {
        /// Description of the problem.
        reason: String,
    },

    /// An operation was issued on a channel that is not connected.
    #[error("{cid} is not connected (state: {state})")]
    NotConnected {
        /// The channel the operation was issued on.
        cid: ChannelId,
        /// The channel's state at the time.
        state: ChannelState,
    },

    /// The context has been closed.
    #[error("context closed")]
    Closed,

    /// The operation was cancelled before a response arrived.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Returns `true` if this is a transport-layer error.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if this is a protocol-layer error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns `true` if the failure clears on its own: connection
    /// attempts are retried and disconnected channels re-enter search, so
    /// the same operation may succeed later without intervention.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(error) => {
                matches!(error, TransportError::ConnectFailed { .. })
            }
            Self::NotConnected { .. } => true,
            _ => false,
        }
    }
}


// Made with Bob
