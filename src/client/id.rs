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

//! Client-assigned protocol identifiers.
//!
//! A [`ChannelId`] names a channel for its whole lifetime; an [`Ioid`]
//! correlates one request with its responses. Both are allocated from
//! per-context atomic counters, so no lock is taken on the id path.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Client-assigned channel identifier, unique within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Wraps a raw wire value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid-{}", self.0)
    }
}

/// I/O operation identifier correlating a request with its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ioid(u32);

/// Reserved id that terminates a packed response batch. Never assigned to
/// a request.
pub const INVALID_IOID: Ioid = Ioid(0);

impl Ioid {
    /// Wraps a raw wire value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this id can belong to a request.
    pub const fn is_valid(&self) -> bool {
        self.0 != INVALID_IOID.0
    }
}

impl fmt::Display for Ioid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ioid-{}", self.0)
    }
}

/// Allocator for [`ChannelId`]s.
#[derive(Debug)]
pub(crate) struct CidGenerator {
    next: AtomicU32,
}

impl CidGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Returns the next channel id, skipping 0 on wraparound.
    pub(crate) fn next(&self) -> ChannelId {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return ChannelId(raw);
            }
        }
    }
}

/// Allocator for [`Ioid`]s.
#[derive(Debug)]
pub(crate) struct IoidGenerator {
    next: AtomicU32,
}

impl IoidGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Returns the next operation id, skipping [`INVALID_IOID`] on
    /// wraparound.
    pub(crate) fn next(&self) -> Ioid {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return Ioid(raw);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn rewind(&self, raw: u32) {
        self.next.store(raw, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let cids = CidGenerator::new();
        assert_eq!(cids.next(), ChannelId::new(1));
        assert_eq!(cids.next(), ChannelId::new(2));

        let ioids = IoidGenerator::new();
        assert_eq!(ioids.next(), Ioid::new(1));
        assert_eq!(ioids.next(), Ioid::new(2));
    }

    #[test]
    fn test_ioid_wraparound_skips_invalid() {
        let ioids = IoidGenerator {
            next: AtomicU32::new(u32::MAX),
        };
        assert_eq!(ioids.next(), Ioid::new(u32::MAX));
        let wrapped = ioids.next();
        assert!(wrapped.is_valid());
        assert_eq!(wrapped, Ioid::new(1));
    }

    #[test]
    fn test_invalid_ioid_is_zero() {
        assert_eq!(INVALID_IOID.as_u32(), 0);
        assert!(!INVALID_IOID.is_valid());
        assert!(Ioid::new(7).is_valid());
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(ChannelId::new(3).to_string(), "cid-3");
        assert_eq!(Ioid::new(9).to_string(), "ioid-9");
    }
}
