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

//! The client context and its channels.
//!
//! A [`Context`] owns everything one client needs: the discovery socket,
//! the search and beacon machinery, the per-server connection pool, and
//! the registries that correlate responses back to channels and requests.
//! Applications create channels by name; the context finds the owning
//! server, validates a connection to it, and drives each channel through
//! its lifecycle, reporting progress through the application's
//! [`ChannelListener`].
//!
//! ```rust,no_run
//! use cdap::client::{ChannelId, ChannelListener, ClientConfig, Context};
//! use std::sync::Arc;
//!
//! struct Watcher;
//!
//! impl ChannelListener for Watcher {
//!     fn connection_completed(&self, cid: ChannelId, sid: u32) {
//!         println!("{cid} connected with sid {sid}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), cdap::error::ClientError> {
//! let context = Context::new(ClientConfig::new()).await?;
//! let channel = context.create_channel("device:temperature", Arc::new(Watcher))?;
//! // ... issue operations once the channel connects ...
//! channel.destroy();
//! context.close().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
pub(crate) mod context;
mod id;
mod request;
mod security;

pub use self::channel::{Channel, ChannelListener, ChannelState};
pub use self::config::{ClientConfig, DEFAULT_DISCOVERY_PORT};
pub use self::context::Context;
pub use self::id::{ChannelId, Ioid, INVALID_IOID};
pub use self::request::{MessageKind, RequestDisposition, Requester};
pub use self::security::{AnonymousPlugin, SecurityPlugin};
