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

//! Message framing header and command codes.
//!
//! Every protocol message, on both the discovery socket and per-server
//! streams, is preceded by the same six-byte header: protocol version,
//! command code, and payload size. The payload size is authoritative;
//! receivers use it to stay resynchronized even for commands they do
//! not understand.

use crate::wire::error::WireError;
use bytes::BufMut;

/// Size of the framing header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Protocol version this client speaks and advertises in outbound headers.
pub const PROTOCOL_VERSION: u8 = 1;

/// Command codes carried in the framing header.
pub mod command {
    /// Periodic server liveness announcement.
    pub const BEACON: u8 = 0x00;
    /// Connection validation exchange on a new stream transport.
    pub const CONNECTION_VALIDATION: u8 = 0x01;
    /// Liveness probe; payload is reflected verbatim.
    pub const ECHO: u8 = 0x02;
    /// Channel search request (client to servers, possibly relayed).
    pub const SEARCH_REQUEST: u8 = 0x03;
    /// Channel search response (server to client).
    pub const SEARCH_RESPONSE: u8 = 0x04;
    /// Channel creation request/response.
    pub const CREATE_CHANNEL: u8 = 0x05;
    /// Channel destruction, either direction.
    pub const DESTROY_CHANNEL: u8 = 0x06;
    /// Validation verdict closing the handshake.
    pub const CONNECTION_VALIDATED: u8 = 0x07;
    /// Out-of-band diagnostic text for an in-flight request.
    pub const MESSAGE: u8 = 0x08;
    /// Packed batch of responses keyed by request id.
    pub const MULTIPLE_DATA: u8 = 0x09;
}

/// The fixed six-byte header preceding every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version of the sender.
    pub version: u8,
    /// Command code selecting the handler.
    pub command: u8,
    /// Size of the payload that follows, in bytes.
    pub payload_size: u32,
}

impl MessageHeader {
    /// Creates a header.
    pub fn new(version: u8, command: u8, payload_size: u32) -> Self {
        Self {
            version,
            command,
            payload_size,
        }
    }

    /// Decodes a header from exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            version: bytes[0],
            command: bytes[1],
            payload_size: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        }
    }

    /// Decodes a header from the front of a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] if fewer than [`HEADER_SIZE`] bytes
    /// are available.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: HEADER_SIZE,
                remaining: buf.len(),
            });
        }
        let mut fixed = [0u8; HEADER_SIZE];
        fixed.copy_from_slice(&buf[..HEADER_SIZE]);
        Ok(Self::from_bytes(&fixed))
    }

    /// Encodes this header onto a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.command);
        buf.put_u32(self.payload_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_round_trip() {
        let header = MessageHeader::new(PROTOCOL_VERSION, command::SEARCH_RESPONSE, 0x0102_0304);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(MessageHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_decode_short_buffer() {
        let result = MessageHeader::decode(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(WireError::Truncated {
                needed: HEADER_SIZE,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_payload_size_big_endian() {
        let mut buf = BytesMut::new();
        MessageHeader::new(1, command::BEACON, 7).encode(&mut buf);
        assert_eq!(&buf[..], &[1, 0x00, 0, 0, 0, 7]);
    }
}
