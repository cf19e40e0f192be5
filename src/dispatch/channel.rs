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

//! Channel create/destroy response handling.

use crate::client::context::ContextCore;
use crate::client::ChannelId;
use crate::dispatch::table::CommandHandler;
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{command, MessageHeader, MessageWriter, PayloadCursor, Status, PROTOCOL_VERSION};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Completes or fails a channel from the server's create response.
///
/// A create failure is terminal for the channel and reported through its
/// listener, never thrown. A success for a channel that died while the
/// request was in flight is answered with a destroy so the server does
/// not hold an orphan.
pub(crate) struct CreateChannelHandler;

#[async_trait]
impl CommandHandler for CreateChannelHandler {
    fn name(&self) -> &'static str {
        "create-channel"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        _header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        let Some(transport) = origin.transport() else {
            return Err(ProtocolError::UnexpectedOrigin {
                command: "create channel response",
            });
        };
        payload.ensure(8)?;
        let cid = ChannelId::new(payload.read_u32()?);
        let sid = payload.read_u32()?;
        let status = Status::decode_or_ok(payload)?;

        let channel = context.channels().get(cid);
        if status.is_success() {
            let accepted = channel
                .as_ref()
                .is_some_and(|channel| channel.connection_completed(sid, Arc::clone(transport)));
            if !accepted {
                debug!(%cid, sid, "create response for a dead channel; destroying on server");
                let mut writer = MessageWriter::new();
                writer.start(PROTOCOL_VERSION, command::DESTROY_CHANNEL);
                writer.put_u32(cid.as_u32());
                writer.put_u32(sid);
                if let Err(error) = transport.send_message(&mut writer) {
                    debug!(%cid, %error, "orphan destroy not sent");
                }
            }
        } else {
            warn!(%cid, %status, "channel creation failed");
            if let Some(channel) = channel {
                channel.create_failed(&status);
            }
        }
        Ok(())
    }
}

/// Applies a server-initiated channel destroy.
///
/// Unregistered cids are ignored; the server may be echoing a destroy this
/// client already performed.
pub(crate) struct DestroyChannelHandler;

#[async_trait]
impl CommandHandler for DestroyChannelHandler {
    fn name(&self) -> &'static str {
        "destroy-channel"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        _origin: &MessageOrigin,
        _header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        payload.ensure(8)?;
        let cid = ChannelId::new(payload.read_u32()?);
        let sid = payload.read_u32()?;
        trace!(%cid, sid, "server destroyed channel");
        context.on_channel_destroyed_by_server(cid);
        Ok(())
    }
}


// Made with Bob
