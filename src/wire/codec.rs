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

//! Encoders for protocol primitives and the outbound message builder.
//!
//! Addresses always occupy sixteen bytes on the wire: IPv4 addresses travel
//! in IPv4-mapped-IPv6 form and native IPv6 addresses travel as-is. The
//! unspecified address is legal in messages whose sender means "reply to
//! wherever this came from"; [`effective_address`] performs that
//! substitution on the receive path.

use crate::wire::cursor::PayloadCursor;
use crate::wire::error::WireError;
use crate::wire::header::{MessageHeader, HEADER_SIZE};
use crate::wire::status::Status;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Largest length encodable in a single byte of the variable-size scheme.
const SIZE_ONE_BYTE_MAX: usize = 253;

/// Marker byte introducing a four-byte size.
const SIZE_U32_MARKER: u8 = 0xFE;

/// Encodes a length in the variable-size integer scheme.
pub fn put_size(buf: &mut impl BufMut, n: usize) {
    if n <= SIZE_ONE_BYTE_MAX {
        buf.put_u8(n as u8);
    } else {
        buf.put_u8(SIZE_U32_MARKER);
        buf.put_u32(n as u32);
    }
}

/// Encodes a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    put_size(buf, s.len());
    buf.put_slice(s.as_bytes());
}

/// Encodes an address as sixteen bytes, mapping IPv4 into IPv6 space.
pub fn put_address(buf: &mut impl BufMut, ip: IpAddr) {
    let v6 = match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    buf.put_slice(&v6.octets());
}

/// Decodes a sixteen-byte address, collapsing IPv4-mapped forms back to IPv4.
pub fn read_address(cursor: &mut PayloadCursor<'_>) -> Result<IpAddr, WireError> {
    let octets: [u8; 16] = cursor.read_fixed()?;
    let v6 = Ipv6Addr::from(octets);
    Ok(match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    })
}

/// Resolves a decoded (address, port) pair against the datagram or stream
/// sender.
///
/// An unspecified address means "use the sender's address"; a zero port
/// means "use the sender's port".
pub fn effective_address(ip: IpAddr, port: u16, sender: SocketAddr) -> SocketAddr {
    let ip = if ip.is_unspecified() { sender.ip() } else { ip };
    let port = if port == 0 { sender.port() } else { port };
    SocketAddr::new(ip, port)
}

/// Builder for outbound messages.
///
/// `start` lays down a framing header with a zero payload size; `finish`
/// backpatches the real size once the payload is complete. Several messages
/// may be packed into one buffer by calling `start` again, which finishes
/// the message in progress.
///
/// # Examples
///
/// ```rust
/// use cdap::wire::{command, MessageWriter, PROTOCOL_VERSION};
///
/// let mut writer = MessageWriter::new();
/// writer.start(PROTOCOL_VERSION, command::DESTROY_CHANNEL);
/// writer.put_u32(7);
/// writer.put_u32(42);
/// let frame = writer.take();
/// assert_eq!(frame.len(), 6 + 8);
/// assert_eq!(&frame[2..6], &[0, 0, 0, 8]);
/// ```
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: BytesMut,
    mark: Option<usize>,
}

impl MessageWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with `capacity` bytes preallocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            mark: None,
        }
    }

    /// Begins a message, finishing any message already in progress.
    pub fn start(&mut self, version: u8, command: u8) {
        self.finish();
        self.mark = Some(self.buf.len());
        MessageHeader::new(version, command, 0).encode(&mut self.buf);
    }

    /// Closes the message in progress by backpatching its payload size.
    ///
    /// A no-op when no message is open.
    pub fn finish(&mut self) {
        if let Some(mark) = self.mark.take() {
            let payload_size = (self.buf.len() - mark - HEADER_SIZE) as u32;
            self.buf[mark + 2..mark + HEADER_SIZE].copy_from_slice(&payload_size.to_be_bytes());
        }
    }

    /// Finishes the open message and yields the accumulated frames.
    pub fn take(&mut self) -> Bytes {
        self.finish();
        self.buf.split().freeze()
    }

    /// Bytes written so far, including any unfinished message.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Appends a big-endian u16.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    /// Appends a big-endian u32.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Appends raw bytes.
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Appends a variable-size length.
    pub fn put_size(&mut self, n: usize) {
        put_size(&mut self.buf, n);
    }

    /// Appends a length-prefixed string.
    pub fn put_string(&mut self, s: &str) {
        put_string(&mut self.buf, s);
    }

    /// Appends a sixteen-byte address.
    pub fn put_address(&mut self, ip: IpAddr) {
        put_address(&mut self.buf, ip);
    }

    /// Appends a status object.
    pub fn put_status(&mut self, status: &Status) {
        status.encode(&mut self.buf);
    }

    /// Position of the next byte to be written.
    ///
    /// Pair with [`MessageWriter::patch_u16`] for fields whose value is
    /// only known after later fields are written, such as batch counts.
    pub fn mark_position(&self) -> usize {
        self.buf.len()
    }

    /// Overwrites two bytes at `position` with a big-endian u16.
    pub fn patch_u16(&mut self, position: usize, value: u16) {
        self.buf[position..position + 2].copy_from_slice(&value.to_be_bytes());
    }
}

impl AsRef<[u8]> for MessageWriter {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}


// Made with Bob
