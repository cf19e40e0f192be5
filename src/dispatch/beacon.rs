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

//! Server liveness beacon handling.

use crate::client::context::ContextCore;
use crate::discovery::{BeaconEvent, ServerGuid};
use crate::dispatch::table::CommandHandler;
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{effective_address, read_address, MessageHeader, PayloadCursor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Decodes beacons and feeds the tracker.
///
/// Payload: guid, sequentialId, changeCount, address, port, protocol, and
/// an optional trailing typed value. The trailing value's shape belongs to
/// the data layer; without a configured codec it is skipped unread.
pub(crate) struct BeaconHandler;

#[async_trait]
impl CommandHandler for BeaconHandler {
    fn name(&self) -> &'static str {
        "beacon"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        _header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        payload.ensure(34)?;
        let guid = ServerGuid::from_bytes(payload.read_fixed()?);
        let sequential_id = payload.read_u16()?;
        let change_count = payload.read_u16()?;
        let ip = read_address(payload)?;
        let port = payload.read_u16()?;
        let server = effective_address(ip, port, origin.sender());
        let protocol = payload.read_string()?;

        if payload.remaining() > 0 {
            match context.config().value_codec.as_deref() {
                Some(codec) => match codec.decode(payload) {
                    Ok(value) => trace!(%guid, ?value, "beacon extra value"),
                    Err(error) => debug!(%guid, %error, "undecodable beacon extra value ignored"),
                },
                None => trace!(
                    %guid,
                    bytes = payload.remaining(),
                    "beacon extra value skipped"
                ),
            }
        }

        let event = context
            .beacons()
            .observe(guid, server, protocol, sequential_id, change_count);
        if event == Some(BeaconEvent::Changed) {
            context.handle_server_change(server);
        }
        Ok(())
    }
}
