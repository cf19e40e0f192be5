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

//! Request diagnostics and packed response batches.

use crate::client::context::ContextCore;
use crate::client::{Ioid, MessageKind, RequestDisposition, INVALID_IOID};
use crate::dispatch::table::CommandHandler;
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{MessageHeader, PayloadCursor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes out-of-band diagnostic text to the owning requester.
///
/// Diagnostics are best-effort: an unknown ioid or a requester that has
/// already completed just drops the text.
pub(crate) struct MessageHandler;

#[async_trait]
impl CommandHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "message"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        _origin: &MessageOrigin,
        _header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        payload.ensure(5)?;
        let ioid = Ioid::new(payload.read_u32()?);
        let raw_kind = payload.read_u8()?;
        let text = payload.read_string()?;
        let Some(kind) = MessageKind::from_raw(raw_kind) else {
            warn!(%ioid, raw_kind, "unknown diagnostic severity; dropped");
            return Ok(());
        };
        match context.requests().lookup(ioid) {
            Some(requester) => requester.message(kind, text),
            None => debug!(%ioid, kind = %kind, "diagnostic for unknown request dropped"),
        }
        Ok(())
    }
}

/// Unpacks batches of responses multiplexed onto one message.
///
/// The batch is a sequence of (ioid, sub-message) pairs terminated by the
/// invalid-ioid sentinel. Sub-messages carry no length prefix; their shape
/// is known only to the requester that owns the ioid. An unknown ioid
/// therefore loses the rest of the batch: there is no boundary to resume
/// from. That condition is logged as an error and the batch abandoned,
/// without failing the transport.
pub(crate) struct MultipleDataHandler;

#[async_trait]
impl CommandHandler for MultipleDataHandler {
    fn name(&self) -> &'static str {
        "multiple-data"
    }

    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        let Some(transport) = origin.transport() else {
            return Err(ProtocolError::UnexpectedOrigin {
                command: "packed response batch",
            });
        };
        loop {
            if payload.remaining() == 0 {
                debug!(id = %transport.id(), "packed batch ended without sentinel");
                break;
            }
            let ioid = Ioid::new(payload.read_u32()?);
            if ioid == INVALID_IOID {
                break;
            }
            let Some((requester, owner)) = context.requests().lookup_owned(ioid) else {
                error!(
                    id = %transport.id(),
                    %ioid,
                    dropped = payload.remaining(),
                    "unknown ioid in packed batch; remainder is unrecoverable"
                );
                break;
            };
            if owner != transport.id() {
                error!(
                    id = %transport.id(),
                    %ioid,
                    %owner,
                    dropped = payload.remaining(),
                    "packed response on the wrong transport; remainder dropped"
                );
                break;
            }
            match requester.response(header.version, payload) {
                Ok(RequestDisposition::Keep) => {}
                Ok(RequestDisposition::Complete) => {
                    context.requests().complete(ioid);
                }
                Err(error) => {
                    error!(
                        id = %transport.id(),
                        %ioid,
                        %error,
                        dropped = payload.remaining(),
                        "undecodable sub-message; batch remainder dropped"
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}
