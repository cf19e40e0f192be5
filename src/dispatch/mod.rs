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

//! Inbound message routing.
//!
//! Every complete message the transports deliver passes through one
//! [`DispatchTable`] lookup keyed on the command byte. Handlers decode
//! their own payloads from a bounds-checked cursor; decode failures drop
//! the single message and nothing else. The table is built once at
//! context construction and never changes afterwards.

mod beacon;
mod channel;
mod connection;
mod message;
mod search;
mod table;

pub(crate) use self::table::DispatchTable;
