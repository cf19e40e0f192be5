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

//! Transport layer for the discovery and channel-access protocol.
//!
//! All network communication flows through two kinds of transport:
//!
//! - [`DiscoveryTransport`]: the single shared UDP socket carrying search
//!   requests, search responses, and server beacons
//! - [`PeerTransport`]: one TCP connection per server, shared by every
//!   channel resolved to that server
//!
//! The [`TransportPool`] owns the stream transports and guarantees the
//! one-connection-per-server invariant. Inbound traffic from both kinds of
//! socket is delivered upward through the [`FrameSink`] trait, one complete
//! message at a time, tagged with a [`MessageOrigin`] that tells the
//! receiver whether the message arrived over a datagram or a stream.
//!
//! # Architecture
//!
//! Each transport owns its socket I/O on dedicated tasks:
//!
//! - **Framing**: readers reassemble the 6-byte header plus declared
//!   payload before dispatching, so handlers always see whole messages
//! - **Resynchronization**: oversize or truncated payloads are skipped by
//!   their declared size without losing stream framing
//! - **Non-blocking sends**: writers drain a queue, so protocol code never
//!   awaits socket readiness
//! - **Close notification**: a transport that dies remotely reports once
//!   through [`FrameSink::on_transport_closed`]
//!
//! # Receiving messages
//!
//! ```rust
//! use cdap::transport::{FrameSink, MessageOrigin, TransportError, TransportId};
//! use cdap::wire::MessageHeader;
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use std::net::SocketAddr;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl FrameSink for Printer {
//!     async fn on_frame(&self, origin: MessageOrigin, header: MessageHeader, payload: Bytes) {
//!         println!(
//!             "command {} with {} bytes from {}",
//!             header.command,
//!             payload.len(),
//!             origin.sender(),
//!         );
//!     }
//!
//!     async fn on_transport_closed(
//!         &self,
//!         id: TransportId,
//!         remote: SocketAddr,
//!         error: Option<TransportError>,
//!     ) {
//!         println!("{id} to {remote} closed: {error:?}");
//!     }
//! }
//! ```
//!
//! # Connecting
//!
//! ```rust,no_run
//! use cdap::transport::{DiscoveryTransport, TransportPool};
//! use std::sync::Arc;
//!
//! # use cdap::transport::{FrameSink, MessageOrigin, TransportError, TransportId};
//! # use cdap::wire::MessageHeader;
//! # use async_trait::async_trait;
//! # use bytes::Bytes;
//! # use std::net::SocketAddr;
//! # struct Printer;
//! # #[async_trait]
//! # impl FrameSink for Printer {
//! #     async fn on_frame(&self, _: MessageOrigin, _: MessageHeader, _: Bytes) {}
//! #     async fn on_transport_closed(&self, _: TransportId, _: SocketAddr, _: Option<TransportError>) {}
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink: Arc<dyn FrameSink> = Arc::new(Printer);
//!
//! // Shared datagram socket for discovery traffic.
//! let discovery = DiscoveryTransport::bind("0.0.0.0:0".parse()?).await?;
//! discovery.start(Arc::clone(&sink));
//!
//! // Stream connections, deduplicated per server.
//! let pool = TransportPool::new();
//! let server = "10.0.0.7:5075".parse()?;
//! let transport = pool.get_or_connect(server, 16 * 1024 * 1024, sink).await?;
//! transport.validated().await.map_err(|status| status.to_string())?;
//! # Ok(())
//! # }
//! ```

mod error;
mod pool;
mod tcp;
mod traits;
mod types;
mod udp;

pub use self::error::TransportError;
pub use self::pool::TransportPool;
pub use self::tcp::PeerTransport;
pub use self::traits::FrameSink;
pub use self::types::{MessageOrigin, TransportId, ValidationState};
pub use self::udp::{DiscoveryTransport, MAX_DATAGRAM_SIZE};
