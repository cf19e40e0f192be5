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

//! Connection validation handshake and echo handling.

use crate::client::context::ContextCore;
use crate::dispatch::table::CommandHandler;
use crate::error::ProtocolError;
use crate::transport::MessageOrigin;
use crate::wire::{command, MessageHeader, MessageWriter, PayloadCursor, Status, PROTOCOL_VERSION};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Answers the server's validation request on a fresh stream transport.
///
/// The request carries the server's receive buffer size, its introspection
/// registry limit, and the security plugins it offers. The reply states
/// this client's counterparts plus the selected plugin and its initial
/// token.
pub(crate) struct ValidationHandler;

#[async_trait]
impl CommandHandler for ValidationHandler {
    fn name(&self) -> &'static str {
        "connection-validation"
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
                command: "connection validation",
            });
        };
        payload.ensure(6)?;
        let server_buffer_size = payload.read_u32()?;
        let server_registry_size = payload.read_u16()?;
        let offered_count = payload.read_size()?;
        let mut offered = Vec::with_capacity(offered_count.min(16));
        for _ in 0..offered_count {
            offered.push(payload.read_string()?);
        }

        transport.set_remote_buffer_size(server_buffer_size as usize);
        trace!(
            id = %transport.id(),
            server_buffer_size,
            server_registry_size,
            ?offered,
            "validation request"
        );

        let Some(plugin) = context.config().select_plugin(&offered) else {
            warn!(id = %transport.id(), "no security plugin configured; not replying");
            return Ok(());
        };
        debug!(id = %transport.id(), plugin = plugin.name(), "replying to validation");

        let config = context.config();
        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::CONNECTION_VALIDATION);
        writer.put_u32(config.receive_buffer_size);
        writer.put_u16(config.introspection_registry_max_size);
        writer.put_u16(config.qos);
        writer.put_string(plugin.name());
        writer.put_string(plugin.initial_token().as_deref().unwrap_or(""));
        if let Err(error) = transport.send_message(&mut writer) {
            debug!(id = %transport.id(), %error, "validation reply not sent");
        }
        Ok(())
    }
}

/// Applies the server's validation verdict.
///
/// Success opens the transport for channel traffic and releases every
/// waiter; failure tears the transport down and fails what it carried.
pub(crate) struct ValidatedHandler;

#[async_trait]
impl CommandHandler for ValidatedHandler {
    fn name(&self) -> &'static str {
        "connection-validated"
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
                command: "connection validated",
            });
        };
        let status = Status::decode_or_ok(payload)?;
        if status.is_success() {
            debug!(id = %transport.id(), "transport validated");
            transport.mark_validated();
        } else {
            warn!(id = %transport.id(), %status, "validation rejected by server");
            transport.mark_validation_failed(status);
            context.on_validation_failed(transport);
        }
        Ok(())
    }
}

/// Reflected liveness probes.
///
/// Only replies to probes this client sent are expected; an echo request
/// initiated by a server would arrive here too and is treated as a reply
/// carrying an unknown payload, which is dropped.
pub(crate) struct EchoHandler;

#[async_trait]
impl CommandHandler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn handle(
        &self,
        _context: &Arc<ContextCore>,
        origin: &MessageOrigin,
        _header: &MessageHeader,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<(), ProtocolError> {
        match origin {
            MessageOrigin::Stream { transport } => {
                let echoed = Bytes::copy_from_slice(payload.remaining_slice());
                if !transport.complete_echo(echoed) {
                    debug!(id = %transport.id(), "unsolicited echo dropped");
                }
            }
            MessageOrigin::Datagram { source } => {
                trace!(%source, "datagram echo ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, Context};
    use crate::transport::{FrameSink, PeerTransport, TransportError, TransportId};
    use crate::wire::HEADER_SIZE;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn on_frame(&self, _origin: MessageOrigin, _header: MessageHeader, _payload: Bytes) {}

        async fn on_transport_closed(
            &self,
            _id: TransportId,
            _remote: SocketAddr,
            _error: Option<TransportError>,
        ) {
        }
    }

    async fn test_context() -> Context {
        let config = ClientConfig::new()
            .with_discovery_bind("127.0.0.1:0".parse().unwrap())
            .with_broadcast_addresses(vec!["127.0.0.1:9".parse().unwrap()]);
        Context::new(config).await.unwrap()
    }

    async fn connected_pair() -> (Arc<PeerTransport>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let transport = PeerTransport::connect(addr, 1024 * 1024, Arc::new(NullSink))
            .await
            .unwrap();
        let server = accept.await.unwrap();
        (transport, server)
    }

    async fn read_message(server: &mut TcpStream) -> (MessageHeader, Vec<u8>) {
        let mut header_buf = [0u8; HEADER_SIZE];
        server.read_exact(&mut header_buf).await.unwrap();
        let header = MessageHeader::from_bytes(&header_buf);
        let mut payload = vec![0u8; header.payload_size as usize];
        server.read_exact(&mut payload).await.unwrap();
        (header, payload)
    }

    #[tokio::test]
    async fn test_validation_reply_carries_client_parameters() {
        let context = test_context().await;
        let (transport, mut server) = connected_pair().await;

        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::CONNECTION_VALIDATION);
        writer.put_u32(32_768);
        writer.put_u16(0x1FFF);
        writer.put_size(2);
        writer.put_string("x509");
        writer.put_string("anonymous");
        let frame = writer.take();
        let payload = frame[HEADER_SIZE..].to_vec();

        let origin = MessageOrigin::Stream {
            transport: Arc::clone(&transport),
        };
        let header = MessageHeader::new(1, command::CONNECTION_VALIDATION, payload.len() as u32);
        let mut cursor = PayloadCursor::new(&payload);
        ValidationHandler
            .handle(context.core(), &origin, &header, &mut cursor)
            .await
            .unwrap();

        assert_eq!(transport.remote_buffer_size(), 32_768);

        let (reply_header, reply) = read_message(&mut server).await;
        assert_eq!(reply_header.command, command::CONNECTION_VALIDATION);
        let mut reply_cursor = PayloadCursor::new(&reply);
        assert_eq!(
            reply_cursor.read_u32().unwrap(),
            context.config().receive_buffer_size
        );
        assert_eq!(
            reply_cursor.read_u16().unwrap(),
            context.config().introspection_registry_max_size
        );
        assert_eq!(reply_cursor.read_u16().unwrap(), context.config().qos);
        assert_eq!(reply_cursor.read_string().unwrap(), "anonymous");
        assert_eq!(reply_cursor.read_string().unwrap(), "");
        context.close().await;
    }

    #[tokio::test]
    async fn test_validated_success_opens_transport() {
        let context = test_context().await;
        let (transport, _server) = connected_pair().await;

        let status = [0xFFu8];
        let origin = MessageOrigin::Stream {
            transport: Arc::clone(&transport),
        };
        let header = MessageHeader::new(1, command::CONNECTION_VALIDATED, 1);
        let mut cursor = PayloadCursor::new(&status);
        ValidatedHandler
            .handle(context.core(), &origin, &header, &mut cursor)
            .await
            .unwrap();

        assert!(transport.is_validated());
        transport.validated().await.unwrap();
        context.close().await;
    }

    #[tokio::test]
    async fn test_validated_failure_closes_transport() {
        let context = test_context().await;
        let (transport, _server) = connected_pair().await;

        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::CONNECTION_VALIDATED);
        writer.put_status(&Status::error("credentials rejected"));
        let frame = writer.take();
        let payload = frame[HEADER_SIZE..].to_vec();

        let origin = MessageOrigin::Stream {
            transport: Arc::clone(&transport),
        };
        let header = MessageHeader::new(1, command::CONNECTION_VALIDATED, payload.len() as u32);
        let mut cursor = PayloadCursor::new(&payload);
        ValidatedHandler
            .handle(context.core(), &origin, &header, &mut cursor)
            .await
            .unwrap();

        assert!(!transport.is_validated());
        assert!(transport.is_closed());
        let status = transport.validated().await.unwrap_err();
        assert!(status.to_string().contains("credentials rejected"));
        context.close().await;
    }

    #[tokio::test]
    async fn test_echo_reply_completes_waiter() {
        let context = test_context().await;
        let (transport, _server) = connected_pair().await;

        let probe = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.echo(b"ping").await })
        };
        tokio::task::yield_now().await;

        let origin = MessageOrigin::Stream {
            transport: Arc::clone(&transport),
        };
        let header = MessageHeader::new(1, command::ECHO, 4);
        let payload = b"ping".to_vec();
        let mut cursor = PayloadCursor::new(&payload);
        EchoHandler
            .handle(context.core(), &origin, &header, &mut cursor)
            .await
            .unwrap();

        let echoed = probe.await.unwrap().unwrap();
        assert_eq!(&echoed[..], b"ping");
        context.close().await;
    }

    #[tokio::test]
    async fn test_validation_over_datagram_is_rejected() {
        let context = test_context().await;
        let origin = MessageOrigin::Datagram {
            source: "127.0.0.1:5080".parse().unwrap(),
        };
        let header = MessageHeader::new(1, command::CONNECTION_VALIDATION, 0);
        let payload: [u8; 0] = [];
        let mut cursor = PayloadCursor::new(&payload);
        let result = ValidationHandler
            .handle(context.core(), &origin, &header, &mut cursor)
            .await;
        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedOrigin { .. })
        ));
        context.close().await;
    }
}

// Made with Bob
