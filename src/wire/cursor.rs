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

//! Bounds-checked reader over a complete message payload.

use crate::wire::error::WireError;

/// Marker byte introducing a four-byte size in the variable-size scheme.
const SIZE_U32_MARKER: u8 = 0xFE;

/// Reserved null marker in the variable-size scheme.
const SIZE_NULL_MARKER: u8 = 0xFF;

/// A decode cursor over one complete message payload.
///
/// Transports hand payloads to handlers only after the full declared size
/// has been read, so `ensure` here is a pure bounds check and never blocks.
/// Every read runs through `ensure` first; a decode can fail but can never
/// read past the message boundary, which keeps stream framing intact for
/// the next message regardless of what a handler does.
///
/// All multi-byte integers are big-endian.
///
/// # Examples
///
/// ```rust
/// use cdap::wire::PayloadCursor;
///
/// let payload = [0x00, 0x2A, 0x03, b'a', b'b', b'c'];
/// let mut cursor = PayloadCursor::new(&payload);
/// assert_eq!(cursor.read_u16().unwrap(), 42);
/// assert_eq!(cursor.read_string().unwrap(), "abc");
/// assert_eq!(cursor.remaining(), 0);
/// ```
#[derive(Debug)]
pub struct PayloadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    /// Creates a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Guarantees the next `n` bytes are readable.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] if fewer than `n` bytes remain.
    pub fn ensure(&self, n: usize) -> Result<(), WireError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining,
            });
        }
        Ok(())
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current read position from the start of the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The entire payload, independent of the read position.
    pub fn as_slice(&self) -> &'a [u8] {
        self.buf
    }

    /// The unconsumed tail of the payload.
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Advances past `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Reads a fixed-size byte array.
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads `n` bytes as a borrowed slice.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.ensure(n)?;
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_fixed::<1>()?[0])
    }

    /// Reads a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.read_fixed()?))
    }

    /// Reads a length in the variable-size integer scheme.
    ///
    /// Values below 254 occupy one byte; larger values are the marker 0xFE
    /// followed by a big-endian u32. The 0xFF marker denotes null and is
    /// rejected here because callers of `read_size` require a concrete
    /// length.
    ///
    /// # Errors
    ///
    /// [`WireError::NullSize`] on the 0xFF marker, [`WireError::Truncated`]
    /// if the encoding runs past the payload.
    pub fn read_size(&mut self) -> Result<usize, WireError> {
        match self.read_u8()? {
            SIZE_NULL_MARKER => Err(WireError::NullSize),
            SIZE_U32_MARKER => Ok(self.read_u32()? as usize),
            small => Ok(small as usize),
        }
    }

    /// Reads a length-prefixed UTF-8 string borrowed from the payload.
    pub fn read_string(&mut self) -> Result<&'a str, WireError> {
        let len = self.read_size()?;
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_checks_bounds() {
        let cursor = PayloadCursor::new(&[1, 2, 3]);
        assert!(cursor.ensure(3).is_ok());
        assert!(matches!(
            cursor.ensure(4),
            Err(WireError::Truncated {
                needed: 4,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_integer_reads_are_big_endian() {
        let mut cursor = PayloadCursor::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u32().unwrap(), 0x0405_0607);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_read_size_one_byte() {
        let mut cursor = PayloadCursor::new(&[0x00]);
        assert_eq!(cursor.read_size().unwrap(), 0);
        let mut cursor = PayloadCursor::new(&[0xFD]);
        assert_eq!(cursor.read_size().unwrap(), 253);
    }

    #[test]
    fn test_read_size_extended() {
        let mut cursor = PayloadCursor::new(&[0xFE, 0x00, 0x04, 0x93, 0xE0]);
        assert_eq!(cursor.read_size().unwrap(), 300_000);
    }

    #[test]
    fn test_read_size_null_rejected() {
        let mut cursor = PayloadCursor::new(&[0xFF]);
        assert!(matches!(cursor.read_size(), Err(WireError::NullSize)));
    }

    #[test]
    fn test_read_string() {
        let mut cursor = PayloadCursor::new(&[0x05, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(cursor.read_string().unwrap(), "hello");
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let mut cursor = PayloadCursor::new(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            cursor.read_string(),
            Err(WireError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_read_string_truncated_body() {
        let mut cursor = PayloadCursor::new(&[0x05, b'h', b'i']);
        assert!(matches!(cursor.read_string(), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_skip_and_position() {
        let mut cursor = PayloadCursor::new(&[0; 10]);
        cursor.skip(4).unwrap();
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.remaining(), 6);
        assert!(cursor.skip(7).is_err());
        assert_eq!(cursor.position(), 4, "failed skip must not move the cursor");
    }

    #[test]
    fn test_read_fixed_array() {
        let mut cursor = PayloadCursor::new(&[9, 8, 7]);
        let pair: [u8; 2] = cursor.read_fixed().unwrap();
        assert_eq!(pair, [9, 8]);
        assert_eq!(cursor.remaining_slice(), &[7]);
    }
}
