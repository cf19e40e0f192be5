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

//! Per-server stream transport.
//!
//! A [`PeerTransport`] wraps one TCP connection to one server and is shared
//! by every channel resolved to that server. It spawns a reader task that
//! assembles complete messages and hands them to the [`FrameSink`], and a
//! writer task that drains an outbound queue, so callers never block on the
//! socket.

use crate::transport::error::TransportError;
use crate::transport::traits::FrameSink;
use crate::transport::types::{MessageOrigin, TransportId, ValidationState};
use crate::wire::{command, MessageHeader, MessageWriter, Status, HEADER_SIZE, PROTOCOL_VERSION};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Reader and writer tasks for one connection. Dropping aborts both.
struct IoTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for IoTasks {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// One stream connection to one server.
///
/// Created lazily through the
/// [`TransportPool`](crate::transport::TransportPool) when a channel first
/// resolves to a server. The transport starts in
/// [`ValidationState::Pending`] and carries channel traffic only after the
/// connection-validation handshake succeeds.
pub struct PeerTransport {
    id: TransportId,
    remote: SocketAddr,
    peer_version: AtomicU8,
    remote_buffer_size: AtomicUsize,
    send_tx: mpsc::UnboundedSender<Bytes>,
    validation_tx: watch::Sender<ValidationState>,
    pending_echo: Mutex<Option<oneshot::Sender<Bytes>>>,
    closed: AtomicBool,
    io: Mutex<Option<IoTasks>>,
}

impl PeerTransport {
    /// Connects to `remote` and spawns the I/O tasks.
    ///
    /// Inbound payloads larger than `max_payload_size` are discarded in
    /// place (the reader skips exactly the declared size, keeping framing
    /// intact) rather than buffered.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectFailed`] if the connection cannot be
    /// established.
    pub async fn connect(
        remote: SocketAddr,
        max_payload_size: usize,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Arc<Self>, TransportError> {
        let stream = TcpStream::connect(remote)
            .await
            .map_err(|source| TransportError::ConnectFailed {
                address: remote,
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, remote, max_payload_size, sink))
    }

    /// Wraps an already-established stream.
    pub fn from_stream(
        stream: TcpStream,
        remote: SocketAddr,
        max_payload_size: usize,
        sink: Arc<dyn FrameSink>,
    ) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (validation_tx, _) = watch::channel(ValidationState::Pending);

        let transport = Arc::new(Self {
            id: TransportId::next(),
            remote,
            peer_version: AtomicU8::new(0),
            remote_buffer_size: AtomicUsize::new(0),
            send_tx,
            validation_tx,
            pending_echo: Mutex::new(None),
            closed: AtomicBool::new(false),
            io: Mutex::new(None),
        });

        let reader = tokio::spawn(read_loop(
            Arc::clone(&transport),
            read_half,
            sink,
            max_payload_size,
        ));
        let writer = tokio::spawn(write_loop(transport.id, write_half, send_rx));
        *transport.io.lock() = Some(IoTasks { reader, writer });

        debug!(id = %transport.id, %remote, "stream transport established");
        transport
    }

    /// This transport's process-unique id.
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// The server address this transport is connected to.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Protocol version from the most recent inbound header, 0 before any
    /// message has arrived.
    pub fn peer_version(&self) -> u8 {
        self.peer_version.load(Ordering::Relaxed)
    }

    pub(crate) fn record_peer_version(&self, version: u8) {
        self.peer_version.store(version, Ordering::Relaxed);
    }

    /// Receive buffer size announced by the server during validation.
    pub fn remote_buffer_size(&self) -> usize {
        self.remote_buffer_size.load(Ordering::Relaxed)
    }

    /// Records the server's announced receive buffer size.
    pub fn set_remote_buffer_size(&self, size: usize) {
        self.remote_buffer_size.store(size, Ordering::Relaxed);
    }

    /// Whether the transport has been closed locally or by the peer.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the validation handshake has succeeded.
    pub fn is_validated(&self) -> bool {
        matches!(&*self.validation_tx.borrow(), ValidationState::Validated)
    }

    /// Queues a complete frame for transmission.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] if the transport is no longer usable.
    pub fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.send_tx
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    /// Finishes and queues everything accumulated in `writer`.
    pub fn send_message(&self, writer: &mut MessageWriter) -> Result<(), TransportError> {
        self.send(writer.take())
    }

    /// Waits until the validation handshake concludes.
    ///
    /// # Errors
    ///
    /// The rejection [`Status`] if validation failed or the transport
    /// closed while still pending.
    pub async fn validated(&self) -> Result<(), Status> {
        let mut rx = self.validation_tx.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    ValidationState::Validated => return Ok(()),
                    ValidationState::Failed(status) => return Err(status.clone()),
                    ValidationState::Pending => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err(Status::error("transport closed"));
            }
        }
    }

    /// Marks the handshake successful, releasing waiting channels.
    ///
    /// Ignored if validation already concluded.
    pub(crate) fn mark_validated(&self) {
        self.validation_tx.send_if_modified(|state| {
            if *state == ValidationState::Pending {
                *state = ValidationState::Validated;
                true
            } else {
                false
            }
        });
    }

    /// Marks the handshake rejected.
    ///
    /// Ignored if validation already concluded.
    pub(crate) fn mark_validation_failed(&self, status: Status) {
        self.validation_tx.send_if_modified(|state| {
            if *state == ValidationState::Pending {
                *state = ValidationState::Failed(status);
                true
            } else {
                false
            }
        });
    }

    /// Sends a liveness probe and waits for the server to reflect it.
    ///
    /// One probe may be outstanding per transport; starting another
    /// supersedes the previous one, which then fails with
    /// [`TransportError::Closed`].
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] if the transport dies before the reply.
    pub async fn echo(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        let (tx, rx) = oneshot::channel();
        *self.pending_echo.lock() = Some(tx);

        let mut writer = MessageWriter::with_capacity(HEADER_SIZE + payload.len());
        writer.start(PROTOCOL_VERSION, command::ECHO);
        writer.put_slice(payload);
        self.send_message(&mut writer)?;

        rx.await.map_err(|_| TransportError::Closed)
    }

    /// Routes a reflected echo payload to the waiting probe.
    ///
    /// Returns false when no probe is outstanding.
    pub(crate) fn complete_echo(&self, payload: Bytes) -> bool {
        match self.pending_echo.lock().take() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Closes the transport, aborting both I/O tasks.
    ///
    /// Waiters blocked in [`PeerTransport::validated`] or
    /// [`PeerTransport::echo`] are released with failures. The
    /// [`FrameSink`] close callback does not fire for a local close; the
    /// caller is expected to do its own cleanup.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.mark_validation_failed(Status::error("transport closed"));
        self.pending_echo.lock().take();
        self.io.lock().take();
        trace!(id = %self.id, remote = %self.remote, "transport closed locally");
    }
}

impl std::fmt::Debug for PeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransport")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("validated", &self.is_validated())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Reads framed messages and dispatches them until the connection ends.
async fn read_loop(
    transport: Arc<PeerTransport>,
    mut read_half: OwnedReadHalf,
    sink: Arc<dyn FrameSink>,
    max_payload_size: usize,
) {
    let mut header_buf = [0u8; HEADER_SIZE];
    let error = loop {
        match read_half.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break None,
            Err(e) => break Some(TransportError::Io(e)),
        }
        let header = MessageHeader::from_bytes(&header_buf);
        let size = header.payload_size as usize;

        if size > max_payload_size {
            warn!(
                id = %transport.id,
                command = header.command,
                size,
                limit = max_payload_size,
                "oversize payload discarded"
            );
            if let Err(e) = discard_exact(&mut read_half, size).await {
                break Some(TransportError::Io(e));
            }
            continue;
        }

        let mut payload = BytesMut::zeroed(size);
        if size > 0 {
            if let Err(e) = read_half.read_exact(&mut payload[..]).await {
                break Some(TransportError::Io(e));
            }
        }

        transport.record_peer_version(header.version);
        let origin = MessageOrigin::Stream {
            transport: Arc::clone(&transport),
        };
        sink.on_frame(origin, header, payload.freeze()).await;
    };

    if transport.closed.swap(true, Ordering::AcqRel) {
        return;
    }
    transport.mark_validation_failed(Status::error("transport closed"));
    transport.pending_echo.lock().take();
    sink.on_transport_closed(transport.id, transport.remote, error)
        .await;
}

/// Skips exactly `size` bytes from the stream.
async fn discard_exact(read_half: &mut OwnedReadHalf, size: usize) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk.len());
        read_half.read_exact(&mut chunk[..n]).await?;
        remaining -= n;
    }
    Ok(())
}

/// Drains the outbound queue onto the socket.
async fn write_loop(
    id: TransportId,
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(frame) = send_rx.recv().await {
        if let Err(error) = write_half.write_all(&frame).await {
            debug!(%id, %error, "write failed; stopping writer");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}


// Made with Bob
