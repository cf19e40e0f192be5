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

//! Server liveness tracking.
//!
//! Servers announce themselves with periodic beacons. The tracker keeps
//! one [`BeaconRecord`] per server GUID and watches its change count: an
//! unchanged count is a liveness refresh, a changed count means the server
//! restarted or was reconfigured, invalidating everything previously
//! resolved to it.
//!
//! Beacons from servers nobody listens for are dropped without being
//! recorded. Not an error; most beacons on a subnet belong to servers this
//! client never talks to.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Opaque 12-byte server instance identifier.
///
/// A GUID survives for one server process lifetime; a restarted server
/// generates a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerGuid([u8; 12]);

impl ServerGuid {
    /// Wraps raw wire bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// The raw wire bytes.
    pub const fn octets(&self) -> [u8; 12] {
        self.0
    }
}

impl fmt::Display for ServerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Last known beacon state for one server.
#[derive(Debug, Clone)]
pub struct BeaconRecord {
    /// The server's instance identifier.
    pub guid: ServerGuid,
    /// The endpoint the server announced.
    pub server: SocketAddr,
    /// Protocol the server speaks on that endpoint.
    pub protocol: String,
    /// Beacon counter, incremented per beacon, wraps.
    pub sequential_id: u16,
    /// Configuration generation. A transition signals a restart.
    pub change_count: u16,
    /// When the most recent beacon arrived.
    pub last_seen: Instant,
}

/// What one observed beacon meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconEvent {
    /// First beacon from this GUID.
    Registered,
    /// Liveness refresh; nothing changed.
    Refreshed,
    /// The change count moved; the server restarted or reconfigured.
    Changed,
}

/// Observer for beacons from one (protocol, address) pair. Methods
/// default to no-ops.
pub trait BeaconListener: Send + Sync {
    /// The server sent a beacon; it is alive.
    fn beacon_refreshed(&self, record: &BeaconRecord) {
        let _ = record;
    }

    /// The server's change count moved. Anything resolved to it before
    /// this beacon is suspect.
    fn server_changed(&self, record: &BeaconRecord) {
        let _ = record;
    }
}

type ListenerKey = (String, SocketAddr);

/// Per-GUID beacon records plus the listeners interested in them.
pub(crate) struct BeaconTracker {
    records: RwLock<HashMap<ServerGuid, BeaconRecord>>,
    listeners: RwLock<HashMap<ListenerKey, Vec<Arc<dyn BeaconListener>>>>,
}

impl BeaconTracker {
    pub(crate) fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a listener for beacons from (`protocol`, `address`). Several
    /// listeners may watch the same server.
    pub(crate) fn register_listener(
        &self,
        protocol: &str,
        address: SocketAddr,
        listener: Arc<dyn BeaconListener>,
    ) {
        self.listeners
            .write()
            .entry((protocol.to_string(), address))
            .or_default()
            .push(listener);
    }

    /// Removes a previously registered listener, matched by identity.
    pub(crate) fn unregister_listener(
        &self,
        protocol: &str,
        address: SocketAddr,
        listener: &Arc<dyn BeaconListener>,
    ) {
        let mut listeners = self.listeners.write();
        let key = (protocol.to_string(), address);
        if let Some(watchers) = listeners.get_mut(&key) {
            watchers.retain(|watcher| !Arc::ptr_eq(watcher, listener));
            if watchers.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    /// Feeds one decoded beacon through the tracker.
    ///
    /// Returns `None` when no listener watches the sending server; the
    /// beacon is then dropped unrecorded. Otherwise the record is updated
    /// and the matching event is delivered to every listener with the
    /// record lock released.
    pub(crate) fn observe(
        &self,
        guid: ServerGuid,
        server: SocketAddr,
        protocol: &str,
        sequential_id: u16,
        change_count: u16,
    ) -> Option<BeaconEvent> {
        let watchers: Vec<Arc<dyn BeaconListener>> = {
            let listeners = self.listeners.read();
            listeners
                .get(&(protocol.to_string(), server))?
                .clone()
        };

        let (event, record) = {
            let mut records = self.records.write();
            let event = match records.get(&guid) {
                None => BeaconEvent::Registered,
                Some(previous) if previous.change_count != change_count => BeaconEvent::Changed,
                Some(_) => BeaconEvent::Refreshed,
            };
            let record = BeaconRecord {
                guid,
                server,
                protocol: protocol.to_string(),
                sequential_id,
                change_count,
                last_seen: Instant::now(),
            };
            records.insert(guid, record.clone());
            (event, record)
        };

        for watcher in &watchers {
            match event {
                BeaconEvent::Changed => watcher.server_changed(&record),
                BeaconEvent::Registered | BeaconEvent::Refreshed => {
                    watcher.beacon_refreshed(&record)
                }
            }
        }
        Some(event)
    }

    /// The last recorded beacon state for `guid`.
    pub(crate) fn record(&self, guid: ServerGuid) -> Option<BeaconRecord> {
        self.records.read().get(&guid).cloned()
    }

    /// Snapshot of every known server.
    pub(crate) fn records(&self) -> Vec<BeaconRecord> {
        self.records.read().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.read().len()
    }
}

impl fmt::Debug for BeaconTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconTracker")
            .field("servers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingListener {
        events: StdMutex<Vec<String>>,
    }

    impl BeaconListener for RecordingListener {
        fn beacon_refreshed(&self, record: &BeaconRecord) {
            self.events
                .lock()
                .unwrap()
                .push(format!("refreshed {}", record.change_count));
        }

        fn server_changed(&self, record: &BeaconRecord) {
            self.events
                .lock()
                .unwrap()
                .push(format!("changed {}", record.change_count));
        }
    }

    fn guid(seed: u8) -> ServerGuid {
        ServerGuid::from_bytes([seed; 12])
    }

    fn server() -> SocketAddr {
        "10.0.0.7:5075".parse().unwrap()
    }

    #[test]
    fn test_unwatched_server_is_dropped_unrecorded() {
        let tracker = BeaconTracker::new();
        assert_eq!(tracker.observe(guid(1), server(), "tcp", 0, 1), None);
        assert_eq!(tracker.len(), 0);
        assert!(tracker.record(guid(1)).is_none());
    }

    #[test]
    fn test_change_count_transition_signals_once() {
        let tracker = BeaconTracker::new();
        let listener = Arc::new(RecordingListener::default());
        tracker.register_listener("tcp", server(), Arc::clone(&listener) as _);

        let mut events = Vec::new();
        for (seq, change_count) in [1u16, 1, 1, 2, 2].iter().enumerate() {
            events.push(
                tracker
                    .observe(guid(1), server(), "tcp", seq as u16, *change_count)
                    .unwrap(),
            );
        }

        assert_eq!(
            events,
            vec![
                BeaconEvent::Registered,
                BeaconEvent::Refreshed,
                BeaconEvent::Refreshed,
                BeaconEvent::Changed,
                BeaconEvent::Refreshed,
            ]
        );
        let changed: Vec<_> = listener
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.starts_with("changed"))
            .cloned()
            .collect();
        assert_eq!(changed, vec!["changed 2"]);
    }

    #[test]
    fn test_record_tracks_latest_values() {
        let tracker = BeaconTracker::new();
        tracker.register_listener("tcp", server(), Arc::new(RecordingListener::default()) as _);

        tracker.observe(guid(9), server(), "tcp", 3, 1);
        tracker.observe(guid(9), server(), "tcp", 4, 1);

        let record = tracker.record(guid(9)).unwrap();
        assert_eq!(record.sequential_id, 4);
        assert_eq!(record.change_count, 1);
        assert_eq!(record.server, server());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_listeners_stack_and_unregister_by_identity() {
        let tracker = BeaconTracker::new();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        tracker.register_listener("tcp", server(), Arc::clone(&first) as _);
        tracker.register_listener("tcp", server(), Arc::clone(&second) as _);

        tracker.observe(guid(1), server(), "tcp", 0, 1);
        assert_eq!(first.events.lock().unwrap().len(), 1);
        assert_eq!(second.events.lock().unwrap().len(), 1);

        let handle = Arc::clone(&first) as Arc<dyn BeaconListener>;
        tracker.unregister_listener("tcp", server(), &handle);
        tracker.observe(guid(1), server(), "tcp", 1, 1);
        assert_eq!(first.events.lock().unwrap().len(), 1);
        assert_eq!(second.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_guid_displays_as_hex() {
        let guid = ServerGuid::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xAA, 0xFF]);
        assert_eq!(guid.to_string(), "00010203040506070809aaff");
    }
}
