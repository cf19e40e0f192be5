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

//! Transport layer errors.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from the discovery socket and per-server stream transports.
///
/// # Examples
///
/// ```rust
/// use cdap::transport::TransportError;
///
/// let error = TransportError::Closed;
/// if error.should_close_transport() {
///     // fail every request owned by this transport
/// }
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing a stream connection to a server failed.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        /// The server address.
        address: SocketAddr,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Binding the shared discovery socket failed.
    #[error("failed to bind discovery socket on {address}: {source}")]
    BindFailed {
        /// The requested local address.
        address: SocketAddr,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// An established transport failed mid-operation.
    #[error("transport i/o error: {0}")]
    Io(#[from] io::Error),

    /// The transport was closed before or during the operation.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether this error means the owning transport must be torn down.
    ///
    /// Connect and bind failures happen before a transport exists, so only
    /// mid-connection failures answer true. Teardown fails every in-flight
    /// request owned by the transport.
    pub fn should_close_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_close_transport() {
        let io = TransportError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(io.should_close_transport());
        assert!(TransportError::Closed.should_close_transport());

        let connect = TransportError::ConnectFailed {
            address: "127.0.0.1:9".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(!connect.should_close_transport());
    }

    #[test]
    fn test_display_includes_address() {
        let error = TransportError::BindFailed {
            address: "0.0.0.0:5080".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(error.to_string().contains("0.0.0.0:5080"));
    }
}
