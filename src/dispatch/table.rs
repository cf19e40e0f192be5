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

//! Command byte to handler routing.

use crate::client::context::ContextCore;
use crate::dispatch::beacon::BeaconHandler;
use crate::dispatch::channel::{CreateChannelHandler, DestroyChannelHandler};
use crate::dispatch::connection::{EchoHandler, ValidatedHandler, ValidationHandler};
use crate::dispatch::message::{MessageHandler, MultipleDataHandler};
use crate::dispatch::search::{SearchRequestHandler, SearchResponseHandler};
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{command, MessageHeader, PayloadCursor};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// One inbound command's decode-and-act logic.
///
/// A handler sees a complete payload and never the socket, so a slow or
/// failing handler cannot desynchronize framing. Returning an error drops
/// the single message; it never tears down the transport or the reader
/// loop.
#[async_trait]
pub(crate) trait CommandHandler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Handles one message.
    async fn handle(
        &self,
        context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError>;
}

/// Fixed 256-slot dispatch array indexed by command byte.
///
/// Populated once at context construction; dispatch is a single array
/// load. Unknown commands are skipped, which together with size-prefixed
/// framing lets this client coexist with newer protocol revisions.
pub(crate) struct DispatchTable {
    handlers: [Option<Arc<dyn CommandHandler>>; 256],
}

impl DispatchTable {
    /// A table with every slot empty.
    pub(crate) fn empty() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// The standard client table covering every protocol command.
    pub(crate) fn standard() -> Self {
        let mut table = Self::empty();
        table.register(command::BEACON, Arc::new(BeaconHandler));
        table.register(command::CONNECTION_VALIDATION, Arc::new(ValidationHandler));
        table.register(command::ECHO, Arc::new(EchoHandler));
        table.register(command::SEARCH_REQUEST, Arc::new(SearchRequestHandler));
        table.register(command::SEARCH_RESPONSE, Arc::new(SearchResponseHandler));
        table.register(command::CREATE_CHANNEL, Arc::new(CreateChannelHandler));
        table.register(command::DESTROY_CHANNEL, Arc::new(DestroyChannelHandler));
        table.register(command::CONNECTION_VALIDATED, Arc::new(ValidatedHandler));
        table.register(command::MESSAGE, Arc::new(MessageHandler));
        table.register(command::MULTIPLE_DATA, Arc::new(MultipleDataHandler));
        table
    }

    /// Installs `handler` for `command`, replacing any existing entry.
    pub(crate) fn register(&mut self, command: u8, handler: Arc<dyn CommandHandler>) {
        self.handlers[command as usize] = Some(handler);
    }

    /// Routes one complete message to its handler.
    ///
    /// Handler errors are logged and swallowed here: a malformed payload
    /// costs that one message, never the dispatch loop.
    pub(crate) async fn dispatch(
        &self,
        context: &Arc<ContextCore>,
        origin: MessageOrigin,
        header: MessageHeader,
        payload: Bytes,
    ) {
        let Some(handler) = &self.handlers[header.command as usize] else {
            trace!(command = header.command, "no handler for command; skipped");
            return;
        };
        let mut cursor = PayloadCursor::new(&payload);
        if let Err(error) = handler.handle(context, &origin, &header, &mut cursor).await {
            warn!(
                handler = handler.name(),
                command = header.command,
                ?origin,
                %error,
                "message dropped"
            );
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.handlers.iter().flatten().count();
        f.debug_struct("DispatchTable")
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, Context};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CommandHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(
            &self,
            _context: &Arc<ContextCore>,
            _origin: &MessageOrigin,
            _header: &MessageHeader,
            payload: &mut PayloadCursor<'_>,
        ) -> Result<(), ProtocolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                payload.ensure(usize::MAX).map_err(ProtocolError::from)?;
            }
            Ok(())
        }
    }

    async fn test_context() -> Context {
        let config = ClientConfig::new()
            .with_discovery_bind("127.0.0.1:0".parse().unwrap())
            .with_broadcast_addresses(vec!["127.0.0.1:9".parse().unwrap()]);
        Context::new(config).await.unwrap()
    }

    fn origin() -> MessageOrigin {
        MessageOrigin::Datagram {
            source: "127.0.0.1:5080".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_command_byte() {
        let context = test_context().await;
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let mut table = DispatchTable::empty();
        table.register(0x42, Arc::clone(&handler) as Arc<dyn CommandHandler>);

        let header = MessageHeader::new(1, 0x42, 0);
        table
            .dispatch(context.core(), origin(), header, Bytes::new())
            .await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        // Unknown command is skipped without touching other slots.
        let unknown = MessageHeader::new(1, 0x43, 0);
        table
            .dispatch(context.core(), origin(), unknown, Bytes::new())
            .await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        context.close().await;
    }

    #[tokio::test]
    async fn test_handler_error_does_not_escape() {
        let context = test_context().await;
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let mut table = DispatchTable::empty();
        table.register(0x01, Arc::clone(&handler) as Arc<dyn CommandHandler>);

        let header = MessageHeader::new(1, 0x01, 0);
        table
            .dispatch(context.core(), origin(), header, Bytes::new())
            .await;
        table
            .dispatch(context.core(), origin(), MessageHeader::new(1, 0x01, 0), Bytes::new())
            .await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        context.close().await;
    }

    #[tokio::test]
    async fn test_standard_table_covers_all_commands() {
        let commands = [
            command::BEACON,
            command::CONNECTION_VALIDATION,
            command::ECHO,
            command::SEARCH_REQUEST,
            command::SEARCH_RESPONSE,
            command::CREATE_CHANNEL,
            command::DESTROY_CHANNEL,
            command::CONNECTION_VALIDATED,
            command::MESSAGE,
            command::MULTIPLE_DATA,
        ];
        let table = DispatchTable::standard();
        for command in commands {
            assert!(
                table.handlers[command as usize].is_some(),
                "command {command:#04x} has no handler"
            );
        }
    }
}
