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

//! Server discovery.
//!
//! Two cooperating pieces find and watch servers over the shared UDP
//! socket:
//!
//! - the search manager broadcasts batched name-resolution requests with
//!   capped exponential backoff until every channel finds its server
//! - the beacon tracker records periodic server announcements, turning a
//!   change-count transition into a restart signal for the layers that
//!   resolved channels to that server
//!
//! Applications observe beacons through [`BeaconListener`]; search is
//! internal and driven entirely by channel creation.

mod beacon;
mod search;

pub use self::beacon::{BeaconEvent, BeaconListener, BeaconRecord, ServerGuid};
pub use self::search::MAX_CHANNEL_NAME;

pub(crate) use self::beacon::BeaconTracker;
pub(crate) use self::search::{SearchManager, QOS_UNICAST, SEARCH_PROTOCOL};
