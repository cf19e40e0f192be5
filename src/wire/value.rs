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

//! Hooks for the structured-data layer.
//!
//! The protocol engine never interprets structured values itself. Beacons
//! and data responses may carry self-describing typed payloads; the
//! application plugs in a [`ValueCodec`] and the engine threads decoded
//! values through as opaque [`TypedValue`] objects.

use crate::wire::cursor::PayloadCursor;
use crate::wire::error::WireError;
use bytes::BytesMut;
use std::any::Any;
use std::fmt;

/// An opaque structured value decoded from the wire.
///
/// The engine only moves these around; downcast via `as_any` to get the
/// concrete type back on the application side.
pub trait TypedValue: fmt::Debug + Send + Sync {
    /// The value as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Encoder/decoder for self-describing typed values.
///
/// Implementations are supplied by the data-model layer through
/// [`ClientConfig::with_value_codec`](crate::client::ClientConfig::with_value_codec).
/// A decode must consume exactly the bytes belonging to the value so the
/// surrounding message stays parseable.
pub trait ValueCodec: Send + Sync {
    /// Decodes one typed value from the cursor.
    ///
    /// # Errors
    ///
    /// Implementations report malformed payloads with
    /// [`WireError::value`]; the enclosing message is then dropped and the
    /// transport survives.
    fn decode(&self, cursor: &mut PayloadCursor<'_>) -> Result<Box<dyn TypedValue>, WireError>;

    /// Encodes a value previously produced by this codec.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Value`] when handed a value of a foreign type.
    fn encode(&self, value: &dyn TypedValue, buf: &mut BytesMut) -> Result<(), WireError>;
}
