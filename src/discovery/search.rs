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

//! Channel name resolution.
//!
//! Unresolved channels live in the search manager's pending set. A timer
//! task batches every due entry into search datagrams, sends them to the
//! configured broadcast and unicast targets, and reschedules each entry on
//! a doubling interval capped at the configured ceiling. There is no
//! attempt limit; a server that has not started yet will be found when it
//! does.
//!
//! An entry leaves the pending set the instant a search response names its
//! cid ([`SearchManager::resolved`] fires at most once per registration)
//! or when the channel is destroyed.

use crate::client::config::ClientConfig;
use crate::client::id::ChannelId;
use crate::transport::DiscoveryTransport;
use crate::wire::{command, MessageWriter, HEADER_SIZE, PROTOCOL_VERSION};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time;
use tracing::{debug, trace};

/// Search datagrams stay under this size so they survive any sane MTU.
pub(crate) const MAX_SEARCH_DATAGRAM: usize = 1440;

/// Longest accepted channel name, in bytes. Channel creation rejects
/// anything longer, which keeps every search entry small enough to share
/// a datagram with others.
pub const MAX_CHANNEL_NAME: usize = 500;

/// Bit in the search qos byte marking a directed (unicast) request.
/// Receivers clear it before relaying, which prevents forwarding loops.
pub(crate) const QOS_UNICAST: u8 = 0x80;

/// The transport protocol searches ask servers to answer for.
pub(crate) const SEARCH_PROTOCOL: &str = "tcp";

struct PendingSearch {
    cid: ChannelId,
    name: String,
    attempts: u32,
    interval: Duration,
    next_retry: Instant,
}

/// Pending-search set plus the retry scheduler state.
pub(crate) struct SearchManager {
    pending: Mutex<HashMap<ChannelId, PendingSearch>>,
    sequence: AtomicU32,
    floor: Duration,
    ceiling: Duration,
    jitter: bool,
    reply_port: u16,
    wake: Notify,
    closed: AtomicBool,
}

impl SearchManager {
    /// `reply_port` is the local discovery port servers should answer to.
    pub(crate) fn new(config: &ClientConfig, reply_port: u16) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            sequence: AtomicU32::new(1),
            floor: config.search_backoff_floor,
            ceiling: config.search_backoff_ceiling,
            jitter: config.search_jitter,
            reply_port,
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Adds a channel to the pending set, due immediately. Re-registering
    /// an existing cid resets its backoff.
    pub(crate) fn register(&self, cid: ChannelId, name: &str) {
        self.pending.lock().insert(
            cid,
            PendingSearch {
                cid,
                name: name.to_string(),
                attempts: 0,
                interval: self.floor,
                next_retry: Instant::now(),
            },
        );
        self.wake.notify_one();
    }

    /// Removes a destroyed channel from the pending set.
    pub(crate) fn cancel(&self, cid: ChannelId) -> bool {
        self.pending.lock().remove(&cid).is_some()
    }

    /// Takes `cid` out of the pending set because a response named it.
    ///
    /// Returns true only for the first response; duplicates find the entry
    /// already gone and must be ignored by the caller.
    pub(crate) fn resolved(&self, cid: ChannelId) -> bool {
        self.pending.lock().remove(&cid).is_some()
    }

    /// Makes every pending entry due now with its backoff reset. Called
    /// when a server appears or restarts, since it may now own names that
    /// have been backing off for a while.
    pub(crate) fn boost(&self) {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        for entry in pending.values_mut() {
            entry.interval = self.floor;
            entry.next_retry = now;
        }
        drop(pending);
        self.wake.notify_one();
    }

    /// Number of unresolved channels.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stops the timer task.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Drains due entries into search datagrams and reschedules them.
    ///
    /// Each datagram carries exactly one search message; entries that
    /// would push a message past [`MAX_SEARCH_DATAGRAM`] start the next
    /// one. The returned deadline is the earliest `next_retry` left in the
    /// pending set, `None` when the set is empty.
    pub(crate) fn collect_due(&self, now: Instant) -> (Vec<Bytes>, Option<Instant>) {
        let mut pending = self.pending.lock();
        let mut due: Vec<ChannelId> = pending
            .values()
            .filter(|entry| entry.next_retry <= now)
            .map(|entry| entry.cid)
            .collect();
        due.sort_unstable();

        let mut datagrams = Vec::new();
        let mut writer = MessageWriter::new();
        let mut count_at = 0;
        let mut in_batch: u16 = 0;
        for cid in due {
            let entry = match pending.get_mut(&cid) {
                Some(entry) => entry,
                None => continue,
            };
            let entry_size = 4 + encoded_string_len(&entry.name);
            if in_batch > 0 && writer.len() + entry_size > MAX_SEARCH_DATAGRAM {
                writer.patch_u16(count_at, in_batch);
                datagrams.push(writer.take());
                in_batch = 0;
            }
            if in_batch == 0 {
                count_at = self.begin_message(&mut writer);
            }
            writer.put_u32(cid.as_u32());
            writer.put_string(&entry.name);
            in_batch += 1;

            entry.attempts += 1;
            entry.next_retry = now + self.jittered(entry.interval);
            entry.interval = (entry.interval * 2).min(self.ceiling);
        }
        if in_batch > 0 {
            writer.patch_u16(count_at, in_batch);
            datagrams.push(writer.take());
        }

        let deadline = pending.values().map(|entry| entry.next_retry).min();
        (datagrams, deadline)
    }

    /// Sends due batches and sleeps until the next deadline, waking early
    /// on registration, boost, or close.
    pub(crate) async fn run(
        self: Arc<Self>,
        discovery: Arc<DiscoveryTransport>,
        broadcast: Vec<SocketAddr>,
        unicast: Vec<SocketAddr>,
    ) {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            let (datagrams, deadline) = self.collect_due(Instant::now());
            if !datagrams.is_empty() {
                trace!(
                    batches = datagrams.len(),
                    pending = self.pending_len(),
                    "sending search batches"
                );
            }
            for datagram in &datagrams {
                for target in &broadcast {
                    if let Err(error) = discovery.send_to(datagram, *target).await {
                        debug!(%target, %error, "search send failed");
                    }
                }
                if !unicast.is_empty() {
                    let directed = with_unicast_flag(datagram);
                    for target in &unicast {
                        if let Err(error) = discovery.send_to(&directed, *target).await {
                            debug!(%target, %error, "search send failed");
                        }
                    }
                }
            }
            match deadline {
                Some(at) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = time::sleep_until(time::Instant::from_std(at)) => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    /// Starts one search message, returning the position of its count
    /// field for later patching.
    fn begin_message(&self, writer: &mut MessageWriter) -> usize {
        writer.start(PROTOCOL_VERSION, command::SEARCH_REQUEST);
        writer.put_u32(self.sequence.fetch_add(1, Ordering::Relaxed));
        writer.put_u8(0);
        writer.put_slice(&[0u8; 3]);
        writer.put_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        writer.put_u16(self.reply_port);
        writer.put_size(1);
        writer.put_string(SEARCH_PROTOCOL);
        let count_at = writer.mark_position();
        writer.put_u16(0);
        count_at
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter {
            // ±10%, small enough that doubling still dominates.
            base.mul_f64(0.9 + rand::random::<f64>() * 0.2)
        } else {
            base
        }
    }
}

impl fmt::Debug for SearchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchManager")
            .field("pending", &self.pending_len())
            .field("floor", &self.floor)
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

fn encoded_string_len(s: &str) -> usize {
    if s.len() <= 253 {
        1 + s.len()
    } else {
        5 + s.len()
    }
}

/// Copy of a search datagram with the unicast qos bit set. The broadcast
/// original is left untouched.
fn with_unicast_flag(datagram: &Bytes) -> Bytes {
    let mut directed = BytesMut::from(&datagram[..]);
    directed[HEADER_SIZE + 4] |= QOS_UNICAST;
    directed.freeze()
}


// Made with Bob
