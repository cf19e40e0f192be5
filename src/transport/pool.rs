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

//! Connection sharing across channels.
//!
//! All channels resolved to the same server share one [`PeerTransport`].
//! Each server address owns a pool slot; callers racing toward the same
//! server queue on that slot's dial lock, and the map lock is never held
//! across connection establishment. A server that stops answering stalls
//! only its own slot.

use crate::transport::error::TransportError;
use crate::transport::tcp::PeerTransport;
use crate::transport::traits::FrameSink;
use crate::transport::types::TransportId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// One server's entry: a dial lock serializing connect attempts and the
/// transport those attempts produced.
#[derive(Debug, Default)]
struct Slot {
    dialing: tokio::sync::Mutex<()>,
    current: Mutex<Option<Arc<PeerTransport>>>,
}

impl Slot {
    /// Returns the slot's transport while it is still open.
    fn established(&self) -> Option<Arc<PeerTransport>> {
        self.current
            .lock()
            .as_ref()
            .filter(|transport| !transport.is_closed())
            .cloned()
    }
}

/// Map of live server connections keyed by remote address.
#[derive(Debug, Default)]
pub struct TransportPool {
    slots: Mutex<HashMap<SocketAddr, Arc<Slot>>>,
}

impl TransportPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live transport for `remote`, connecting if absent.
    ///
    /// Callers racing toward the same server share one connect attempt. A
    /// pooled entry that has since closed is replaced rather than
    /// returned, and a failed attempt leaves the slot empty for the next
    /// caller to retry.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectFailed`] when a fresh connection is
    /// needed and cannot be established.
    pub async fn get_or_connect(
        &self,
        remote: SocketAddr,
        max_payload_size: usize,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Arc<PeerTransport>, TransportError> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(remote).or_default())
        };

        if let Some(existing) = slot.established() {
            return Ok(existing);
        }

        // Dial outside the map lock; only this server's callers wait here.
        let _dial = slot.dialing.lock().await;
        if let Some(existing) = slot.established() {
            return Ok(existing);
        }
        if slot.current.lock().is_some() {
            debug!(%remote, "pooled transport is dead; reconnecting");
        }

        let transport = PeerTransport::connect(remote, max_payload_size, sink).await?;
        *slot.current.lock() = Some(Arc::clone(&transport));

        // close_all may have drained the map mid-dial, leaving this slot
        // orphaned and the fresh transport unreachable through the pool.
        let pooled = self
            .slots
            .lock()
            .get(&remote)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if !pooled {
            slot.current.lock().take();
            transport.close();
            return Err(TransportError::Closed);
        }
        Ok(transport)
    }

    /// Returns the pooled transport for `remote`, if any.
    pub fn get(&self, remote: SocketAddr) -> Option<Arc<PeerTransport>> {
        let slot = self.slots.lock().get(&remote).cloned()?;
        slot.current.lock().clone()
    }

    /// Clears the entry for `remote` only if it still holds transport `id`.
    ///
    /// The id guard keeps a close notification for an old connection from
    /// evicting its replacement.
    pub fn remove(&self, remote: SocketAddr, id: TransportId) -> Option<Arc<PeerTransport>> {
        let slot = self.slots.lock().get(&remote).cloned()?;
        let mut current = slot.current.lock();
        if current.as_ref().is_some_and(|transport| transport.id() == id) {
            current.take()
        } else {
            None
        }
    }

    /// Closes and drops every pooled transport.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        for (_, slot) in drained {
            if let Some(transport) = slot.current.lock().take() {
                transport.close();
            }
        }
    }

    /// Number of pooled connections. A slot whose dial is still in flight
    /// does not count.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .values()
            .filter(|slot| slot.current.lock().is_some())
            .count()
    }

    /// Whether the pool holds no connections.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


// Made with Bob
