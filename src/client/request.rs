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

//! Request multiplexing.
//!
//! Every in-flight operation is keyed by an [`Ioid`] in the context's
//! [`RequestRegistry`]. Inbound responses carry the ioid, the registry maps
//! it back to the [`Requester`] that issued the operation, and the
//! requester decodes its own payload. A requester stays registered across
//! responses until it reports [`RequestDisposition::Complete`], so
//! one-shot calls and long-lived subscriptions share the same path.

use crate::client::id::{Ioid, IoidGenerator};
use crate::error::ClientError;
use crate::transport::TransportId;
use crate::wire::{PayloadCursor, WireError};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Severity of a server-pushed diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Informational notice.
    Info,
    /// Something suspicious but not failing.
    Warning,
    /// The operation is degraded or failing.
    Error,
    /// The operation cannot continue.
    Fatal,
}

impl MessageKind {
    /// Decodes the wire value, `None` for unknown severities.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Info),
            1 => Some(Self::Warning),
            2 => Some(Self::Error),
            3 => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// What the registry should do with a requester after one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    /// Keep the registration; more responses are expected.
    Keep,
    /// The operation is finished; drop the registration.
    Complete,
}

/// Receiver for the responses to one issued operation.
///
/// Callbacks run on the dispatch task and must not block. The registry is
/// never locked while a callback runs, so a requester may issue follow-up
/// operations from inside [`Requester::response`].
pub trait Requester: Send + Sync {
    /// Decodes one response payload addressed to this requester.
    ///
    /// `version` is the protocol version from the response header.
    ///
    /// # Errors
    ///
    /// A decode failure. The dispatcher stops processing the remainder of
    /// the batch the response arrived in.
    fn response(
        &self,
        version: u8,
        payload: &mut PayloadCursor<'_>,
    ) -> Result<RequestDisposition, WireError>;

    /// Receives a server-pushed diagnostic about this operation.
    fn message(&self, kind: MessageKind, text: &str) {
        let _ = (kind, text);
    }

    /// Called once when the operation dies without a response: cancelled
    /// locally, or its transport closed.
    fn cancelled(&self, error: &ClientError) {
        let _ = error;
    }
}

struct RequestEntry {
    requester: Arc<dyn Requester>,
    transport: TransportId,
}

/// Table of in-flight operations keyed by ioid.
pub(crate) struct RequestRegistry {
    entries: RwLock<HashMap<Ioid, RequestEntry>>,
    ioids: IoidGenerator,
}

impl RequestRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ioids: IoidGenerator::new(),
        }
    }

    /// Registers a requester bound to `transport` and assigns it a fresh
    /// ioid. Occupied ids are skipped, so wraparound cannot alias a live
    /// operation.
    pub(crate) fn register(&self, requester: Arc<dyn Requester>, transport: TransportId) -> Ioid {
        let mut entries = self.entries.write();
        loop {
            let ioid = self.ioids.next();
            if let Entry::Vacant(slot) = entries.entry(ioid) {
                slot.insert(RequestEntry {
                    requester,
                    transport,
                });
                return ioid;
            }
        }
    }

    /// The requester registered under `ioid`, if any.
    pub(crate) fn lookup(&self, ioid: Ioid) -> Option<Arc<dyn Requester>> {
        self.entries
            .read()
            .get(&ioid)
            .map(|entry| Arc::clone(&entry.requester))
    }

    /// The requester and owning transport registered under `ioid`.
    pub(crate) fn lookup_owned(&self, ioid: Ioid) -> Option<(Arc<dyn Requester>, TransportId)> {
        self.entries
            .read()
            .get(&ioid)
            .map(|entry| (Arc::clone(&entry.requester), entry.transport))
    }

    /// Removes a finished operation without notifying the requester.
    pub(crate) fn complete(&self, ioid: Ioid) -> Option<Arc<dyn Requester>> {
        self.entries
            .write()
            .remove(&ioid)
            .map(|entry| entry.requester)
    }

    /// Removes an operation and notifies the requester it was cancelled.
    ///
    /// Returns false when the ioid was not registered.
    pub(crate) fn cancel(&self, ioid: Ioid, error: &ClientError) -> bool {
        let removed = self.entries.write().remove(&ioid);
        match removed {
            Some(entry) => {
                entry.requester.cancelled(error);
                true
            }
            None => false,
        }
    }

    /// Fails every operation bound to `transport`, notifying each
    /// requester. Returns how many were failed.
    pub(crate) fn fail_transport(&self, transport: TransportId, error: &ClientError) -> usize {
        let drained: Vec<RequestEntry> = {
            let mut entries = self.entries.write();
            let dead: Vec<Ioid> = entries
                .iter()
                .filter(|(_, entry)| entry.transport == transport)
                .map(|(ioid, _)| *ioid)
                .collect();
            dead.into_iter()
                .filter_map(|ioid| entries.remove(&ioid))
                .collect()
        };
        for entry in &drained {
            entry.requester.cancelled(error);
        }
        drained.len()
    }

    /// Fails every in-flight operation. Returns how many were failed.
    pub(crate) fn fail_all(&self, error: &ClientError) -> usize {
        let drained: Vec<RequestEntry> = {
            let mut entries = self.entries.write();
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &drained {
            entry.requester.cancelled(error);
        }
        drained.len()
    }

    /// Number of in-flight operations.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("in_flight", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Probe {
        events: StdMutex<Vec<String>>,
    }

    impl Requester for Probe {
        fn response(
            &self,
            _version: u8,
            _payload: &mut PayloadCursor<'_>,
        ) -> Result<RequestDisposition, WireError> {
            self.events.lock().unwrap().push("response".to_string());
            Ok(RequestDisposition::Complete)
        }

        fn cancelled(&self, error: &ClientError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("cancelled: {error}"));
        }
    }

    #[test]
    fn test_register_assigns_distinct_ioids() {
        let registry = RequestRegistry::new();
        let transport = TransportId::next();
        let a = registry.register(Arc::new(Probe::default()), transport);
        let b = registry.register(Arc::new(Probe::default()), transport);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_skips_occupied_ids() {
        let registry = RequestRegistry::new();
        let transport = TransportId::next();
        let first = registry.register(Arc::new(Probe::default()), transport);

        // Force the generator to hand out the occupied id again.
        registry.ioids.rewind(first.as_u32());
        let second = registry.register(Arc::new(Probe::default()), transport);
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_is_silent() {
        let registry = RequestRegistry::new();
        let probe = Arc::new(Probe::default());
        let ioid = registry.register(Arc::clone(&probe) as Arc<dyn Requester>, TransportId::next());

        assert!(registry.complete(ioid).is_some());
        assert!(registry.lookup(ioid).is_none());
        assert!(probe.events.lock().unwrap().is_empty());
        assert!(registry.complete(ioid).is_none());
    }

    #[test]
    fn test_cancel_notifies_once() {
        let registry = RequestRegistry::new();
        let probe = Arc::new(Probe::default());
        let ioid = registry.register(Arc::clone(&probe) as Arc<dyn Requester>, TransportId::next());

        assert!(registry.cancel(ioid, &ClientError::Cancelled));
        assert!(!registry.cancel(ioid, &ClientError::Cancelled));
        let events = probe.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("cancelled"));
    }

    #[test]
    fn test_fail_transport_only_touches_its_requests() {
        let registry = RequestRegistry::new();
        let doomed = TransportId::next();
        let healthy = TransportId::next();

        let dead_probe = Arc::new(Probe::default());
        registry.register(Arc::clone(&dead_probe) as Arc<dyn Requester>, doomed);
        let live_probe = Arc::new(Probe::default());
        let live_ioid =
            registry.register(Arc::clone(&live_probe) as Arc<dyn Requester>, healthy);

        let failed = registry.fail_transport(doomed, &ClientError::Closed);
        assert_eq!(failed, 1);
        assert_eq!(dead_probe.events.lock().unwrap().len(), 1);
        assert!(live_probe.events.lock().unwrap().is_empty());
        assert!(registry.lookup(live_ioid).is_some());
    }

    #[test]
    fn test_fail_all_drains_everything() {
        let registry = RequestRegistry::new();
        let transport = TransportId::next();
        let probes: Vec<Arc<Probe>> = (0..3).map(|_| Arc::new(Probe::default())).collect();
        for probe in &probes {
            registry.register(Arc::clone(probe) as Arc<dyn Requester>, transport);
        }

        assert_eq!(registry.fail_all(&ClientError::Closed), 3);
        assert_eq!(registry.len(), 0);
        for probe in &probes {
            assert_eq!(probe.events.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_lookup_owned_reports_transport() {
        let registry = RequestRegistry::new();
        let transport = TransportId::next();
        let ioid = registry.register(Arc::new(Probe::default()), transport);
        let (_, owner) = registry.lookup_owned(ioid).unwrap();
        assert_eq!(owner, transport);
    }
}
