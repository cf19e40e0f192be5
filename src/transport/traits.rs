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

//! The boundary between transports and message handling.

use crate::transport::error::TransportError;
use crate::transport::types::{MessageOrigin, TransportId};
use crate::wire::MessageHeader;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

/// Receiver for complete inbound messages and transport lifecycle events.
///
/// Transports parse framing only: each reader task assembles one complete
/// payload per message and hands it here, so a sink never sees a partial
/// message. Delivery is awaited, which serializes handling per transport.
///
/// The client context implements this by routing into its command dispatch
/// table.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Handles one complete message.
    async fn on_frame(&self, origin: MessageOrigin, header: MessageHeader, payload: Bytes);

    /// Reports a stream transport leaving service.
    ///
    /// `error` is `None` for an orderly close by the peer. Not called when
    /// the local side closes the transport itself.
    async fn on_transport_closed(
        &self,
        id: TransportId,
        remote: SocketAddr,
        error: Option<TransportError>,
    );
}

// Made with Bob
