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

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # CDAP - Channel Discovery and Access Protocol Client
//!
//! This crate is the client side of a discovery-and-access protocol:
//!
//! - **Discovery**: channels are addressed by name; UDP search broadcasts
//!   find the server hosting a name, retrying on a capped exponential
//!   backoff until it answers
//! - **Liveness**: servers announce themselves with periodic beacons; a
//!   change in a server's generation counter triggers revalidation of the
//!   channels it hosts
//! - **Access**: one validated TCP transport per server carries every
//!   channel to that server; requests are multiplexed by ioid and
//!   responses, possibly packed several to a message, are routed back to
//!   their callers
//!
//! ## Architecture
//!
//! - **[`wire`]**: framing, primitive codecs, status objects, and the
//!   outbound message builder
//! - **[`transport`]**: the discovery socket, per-server stream
//!   transports, and the connection pool
//! - **[`discovery`]**: the search retry manager and beacon tracker
//! - **[`client`]**: the context engine, channels, requests,
//!   configuration, and security plugins
//! - **[`error`]**: layered error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdap::client::{ClientConfig, Context, ChannelListener, ChannelId};
//! use std::sync::Arc;
//!
//! struct Watcher;
//!
//! impl ChannelListener for Watcher {
//!     fn connection_completed(&self, cid: ChannelId, sid: u32) {
//!         println!("channel {cid} connected with sid {sid}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), cdap::error::ClientError> {
//! let config = ClientConfig::new()
//!     .with_broadcast_addresses(vec!["10.0.0.255:5080".parse().unwrap()]);
//! let context = Context::new(config).await?;
//!
//! let channel = context.create_channel("device:temperature", Arc::new(Watcher))?;
//! // ... issue requests once the listener reports the channel connected ...
//!
//! channel.destroy();
//! context.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Errors are layered:
//!
//! - [`WireError`]: malformed bytes inside one message
//! - [`TransportError`]: socket-level connect, bind, and I/O failures
//! - [`ProtocolError`]: well-formed bytes that violate the protocol
//! - [`ClientError`]: everything above, plus configuration and lifecycle
//!
//! A malformed message costs that one message, never the connection; only
//! transport-level I/O failure tears down a connection, which then fails
//! the requests it owned.
//!
//! ## Safety
//!
//! 100% safe Rust with `#![deny(unsafe_code)]`. All concurrency is
//! handled through Tokio's async runtime.

pub mod client;
pub mod discovery;
pub(crate) mod dispatch;
pub mod error;
pub mod transport;
pub mod wire;

pub use client::{
    AnonymousPlugin, Channel, ChannelId, ChannelListener, ChannelState, ClientConfig, Context,
    Ioid, MessageKind, RequestDisposition, Requester, SecurityPlugin, DEFAULT_DISCOVERY_PORT,
    INVALID_IOID,
};
pub use discovery::{BeaconEvent, BeaconListener, BeaconRecord, ServerGuid, MAX_CHANNEL_NAME};
pub use error::{ClientError, ProtocolError};
pub use transport::{PeerTransport, TransportError, TransportId};
pub use wire::{Status, StatusType, TypedValue, ValueCodec, WireError};
