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

//! Shared discovery socket.
//!
//! One UDP socket per context carries all connectionless traffic: outbound
//! search batches, inbound search responses, and server beacons. A single
//! datagram may pack several framed messages back to back; the receive
//! loop walks them with the declared payload sizes, so one malformed
//! message never desynchronizes the rest of the datagram.

use crate::transport::error::TransportError;
use crate::transport::traits::FrameSink;
use crate::transport::types::MessageOrigin;
use crate::wire::{MessageHeader, HEADER_SIZE};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Largest datagram the receive loop accepts.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// The context-wide connectionless transport.
pub struct DiscoveryTransport {
    socket: UdpSocket,
    local: SocketAddr,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DiscoveryTransport {
    /// Binds the discovery socket and enables broadcast.
    ///
    /// # Errors
    ///
    /// [`TransportError::BindFailed`] when the address is unavailable;
    /// this is a context-creation failure, not a steady-state one.
    pub async fn bind(address: SocketAddr) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| TransportError::BindFailed { address, source })?;
        socket.set_broadcast(true)?;
        let local = socket.local_addr()?;
        debug!(%local, "discovery socket bound");

        Ok(Arc::new(Self {
            socket,
            local,
            reader: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    /// Spawns the receive loop, delivering inbound messages to `sink`.
    pub fn start(self: &Arc<Self>, sink: Arc<dyn FrameSink>) {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return;
        }
        *reader = Some(tokio::spawn(recv_loop(Arc::clone(self), sink)));
    }

    /// The socket's bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Sends one datagram to `target`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] after [`DiscoveryTransport::close`], or
    /// the underlying socket error.
    pub async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.socket.send_to(datagram, target).await?;
        Ok(())
    }

    /// Stops the receive loop and refuses further sends.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.reader.lock().take() {
            task.abort();
        }
        trace!(local = %self.local, "discovery socket closed");
    }
}

impl std::fmt::Debug for DiscoveryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryTransport")
            .field("local", &self.local)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Receives datagrams and dispatches every framed message inside each one.
async fn recv_loop(transport: Arc<DiscoveryTransport>, sink: Arc<dyn FrameSink>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, source) = match transport.socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(error) => {
                if transport.closed.load(Ordering::Acquire) {
                    return;
                }
                debug!(%error, "discovery receive error");
                continue;
            }
        };
        let datagram = Bytes::copy_from_slice(&buf[..len]);
        deliver_datagram(&sink, source, datagram).await;
    }
}

/// Walks the framed messages packed into one datagram.
async fn deliver_datagram(sink: &Arc<dyn FrameSink>, source: SocketAddr, datagram: Bytes) {
    let mut offset = 0;
    while datagram.len() - offset >= HEADER_SIZE {
        let header = match MessageHeader::decode(&datagram[offset..]) {
            Ok(header) => header,
            Err(_) => return,
        };
        let size = header.payload_size as usize;
        let body = offset + HEADER_SIZE;
        if body + size > datagram.len() {
            warn!(
                %source,
                command = header.command,
                declared = size,
                remaining = datagram.len() - body,
                "datagram truncated mid-message; remainder dropped"
            );
            return;
        }
        let payload = datagram.slice(body..body + size);
        sink.on_frame(MessageOrigin::Datagram { source }, header, payload)
            .await;
        offset = body + size;
    }
    if offset < datagram.len() {
        trace!(
            %source,
            trailing = datagram.len() - offset,
            "datagram carries trailing bytes shorter than a header"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{command, MessageWriter, PROTOCOL_VERSION};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<(SocketAddr, u8, Vec<u8>)>>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn on_frame(&self, origin: MessageOrigin, header: MessageHeader, payload: Bytes) {
            self.frames
                .lock()
                .unwrap()
                .push((origin.sender(), header.command, payload.to_vec()));
        }

        async fn on_transport_closed(
            &self,
            _id: crate::transport::TransportId,
            _remote: SocketAddr,
            _error: Option<TransportError>,
        ) {
        }
    }

    async fn bound() -> Arc<DiscoveryTransport> {
        DiscoveryTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_packed_datagram_dispatches_every_message() {
        let receiver = bound().await;
        let sink = Arc::new(RecordingSink::default());
        receiver.start(Arc::clone(&sink) as Arc<dyn FrameSink>);

        let sender = bound().await;
        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::BEACON);
        writer.put_slice(&[1, 1]);
        writer.start(PROTOCOL_VERSION, command::SEARCH_RESPONSE);
        writer.put_slice(&[2, 2, 2]);
        sender
            .send_to(&writer.take(), receiver.local_addr())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1, command::BEACON);
        assert_eq!(frames[0].2, vec![1, 1]);
        assert_eq!(frames[1].1, command::SEARCH_RESPONSE);
        assert_eq!(frames[1].2, vec![2, 2, 2]);
        assert_eq!(frames[0].0, sender.local_addr());
    }

    #[tokio::test]
    async fn test_truncated_message_drops_remainder_only() {
        let receiver = bound().await;
        let sink = Arc::new(RecordingSink::default());
        receiver.start(Arc::clone(&sink) as Arc<dyn FrameSink>);

        let sender = bound().await;
        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::ECHO);
        writer.put_slice(b"good");
        let mut datagram = writer.take().to_vec();
        // Second message declares 100 payload bytes but carries 2.
        datagram.extend_from_slice(&[PROTOCOL_VERSION, command::ECHO, 0, 0, 0, 100, 9, 9]);
        sender
            .send_to(&datagram, receiver.local_addr())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].2, b"good".to_vec());
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let transport = bound().await;
        transport.close();
        let result = transport.send_to(b"x", "127.0.0.1:9".parse().unwrap()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}

// Made with Bob
