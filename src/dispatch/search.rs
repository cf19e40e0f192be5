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

//! Search request relaying and search response resolution.

use crate::client::context::ContextCore;
use crate::client::ChannelId;
use crate::discovery::{ServerGuid, QOS_UNICAST};
use crate::dispatch::table::CommandHandler;
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{
    command, effective_address, read_address, MessageHeader, MessageWriter, PayloadCursor,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Relays unicast searches back onto the local broadcast domain.
///
/// A search that arrives with the unicast qos bit set was sent directly to
/// this node by a peer outside the broadcast domain. When relaying is
/// enabled the message is re-broadcast with the bit cleared, loop-safe
/// because relayed copies can never relay again, and the reply address
/// rewritten to the original sender so responses skip this node entirely.
pub(crate) struct SearchRequestHandler;

#[async_trait]
impl CommandHandler for SearchRequestHandler {
    fn name(&self) -> &'static str {
        "search-request"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        if origin.transport().is_some() {
            return Err(ProtocolError::UnexpectedOrigin {
                command: "search request",
            });
        }
        payload.ensure(26)?;
        let sequence = payload.read_u32()?;
        let qos = payload.read_u8()?;
        if qos & QOS_UNICAST == 0 || !context.config().relay_enabled {
            return Ok(());
        }
        payload.skip(3)?;
        let _ = read_address(payload)?;
        let _ = payload.read_u16()?;
        let sender = origin.sender();

        let mut writer = MessageWriter::new();
        writer.start(header.version, command::SEARCH_REQUEST);
        writer.put_u32(sequence);
        writer.put_u8(qos & !QOS_UNICAST);
        writer.put_slice(&[0u8; 3]);
        writer.put_address(sender.ip());
        writer.put_u16(sender.port());
        writer.put_slice(payload.remaining_slice());
        let relayed = writer.take();

        trace!(sequence, %sender, "relaying unicast search");
        for target in &context.config().broadcast_addresses {
            if let Err(error) = context.discovery().send_to(&relayed, *target).await {
                debug!(%target, %error, "search relay send failed");
            }
        }
        Ok(())
    }
}

/// Resolves pending searches from server answers.
///
/// One response may name several cids; each is handed to the context,
/// which ignores cids that are no longer pending.
pub(crate) struct SearchResponseHandler;

#[async_trait]
impl CommandHandler for SearchResponseHandler {
    fn name(&self) -> &'static str {
        "search-response"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        payload.ensure(34)?;
        let guid = ServerGuid::from_bytes(payload.read_fixed()?);
        let sequence = payload.read_u32()?;
        let ip = read_address(payload)?;
        let port = payload.read_u16()?;
        let server = effective_address(ip, port, origin.sender());
        let protocol = payload.read_string()?;
        let found = payload.read_u8()? != 0;
        if !found {
            trace!(%guid, sequence, "negative search response");
            return Ok(());
        }

        let count = payload.read_u16()?;
        for _ in 0..count {
            let cid = ChannelId::new(payload.read_u32()?);
            context.channel_resolved(cid, sequence, header.version, server, guid, protocol);
        }
        Ok(())
    }
}


// Made with Bob
