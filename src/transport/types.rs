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

//! Transport identifiers and shared transport types.

use crate::transport::tcp::PeerTransport;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transport connection.
///
/// Request registrations record the id of the transport they were issued
/// on; teardown uses it to fail exactly the requests a dead transport
/// owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// Progress of the connection-validation handshake on a stream transport.
///
/// A transport carries channel traffic only once it reaches `Validated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationState {
    /// Handshake not yet concluded.
    Pending,
    /// The server accepted the validation reply.
    Validated,
    /// The server rejected validation, or the transport closed first.
    Failed(crate::wire::Status),
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Validated => write!(f, "validated"),
            Self::Failed(status) => write!(f, "failed ({status})"),
        }
    }
}

/// Where an inbound message arrived from.
///
/// Handlers use the origin for sender-address substitution and, on stream
/// transports, for replying and for checking request ownership.
#[derive(Clone)]
pub enum MessageOrigin {
    /// Received on the shared discovery socket.
    Datagram {
        /// The datagram's source address.
        source: SocketAddr,
    },
    /// Received on a per-server stream transport.
    Stream {
        /// The transport the message arrived on.
        transport: Arc<PeerTransport>,
    },
}

impl MessageOrigin {
    /// The observed sender address.
    pub fn sender(&self) -> SocketAddr {
        match self {
            Self::Datagram { source } => *source,
            Self::Stream { transport } => transport.remote(),
        }
    }

    /// The stream transport, when the message arrived on one.
    pub fn transport(&self) -> Option<&Arc<PeerTransport>> {
        match self {
            Self::Datagram { .. } => None,
            Self::Stream { transport } => Some(transport),
        }
    }
}

impl fmt::Debug for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datagram { source } => f.debug_struct("Datagram").field("source", source).finish(),
            Self::Stream { transport } => f
                .debug_struct("Stream")
                .field("id", &transport.id())
                .field("remote", &transport.remote())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_ids_are_unique() {
        let a = TransportId::next();
        let b = TransportId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_datagram_origin_sender() {
        let source: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let origin = MessageOrigin::Datagram { source };
        assert_eq!(origin.sender(), source);
        assert!(origin.transport().is_none());
    }

    #[test]
    fn test_validation_state_display() {
        assert_eq!(ValidationState::Pending.to_string(), "pending");
        assert_eq!(ValidationState::Validated.to_string(), "validated");
        let failed = ValidationState::Failed(crate::wire::Status::error("denied"));
        assert_eq!(failed.to_string(), "failed (error: denied)");
    }
}
