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

//! Wire codec for the protocol.
//!
//! This module owns everything that touches raw bytes:
//!
//! - [`MessageHeader`]: the six-byte framing header (version, command,
//!   payload size) preceding every message
//! - [`PayloadCursor`]: bounds-checked decoding over a complete payload
//! - [`MessageWriter`]: outbound message builder with payload-size
//!   backpatching
//! - [`Status`]: the success/failure object trailing several responses
//! - [`TypedValue`] / [`ValueCodec`]: opaque hooks for the structured-data
//!   layer, which is deliberately outside this crate
//!
//! Sizes and strings use a compact variable-size integer scheme; addresses
//! are sixteen bytes with IPv4 carried in mapped form. All integers are
//! big-endian.

mod codec;
mod cursor;
mod error;
mod header;
mod status;
mod value;

pub use self::codec::{
    effective_address, put_address, put_size, put_string, read_address, MessageWriter,
};
pub use self::cursor::PayloadCursor;
pub use self::error::WireError;
pub use self::header::{command, MessageHeader, HEADER_SIZE, PROTOCOL_VERSION};
pub use self::status::{Status, StatusType};
pub use self::value::{TypedValue, ValueCodec};
