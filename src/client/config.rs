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

//! Client context configuration.

use crate::client::security::{AnonymousPlugin, SecurityPlugin};
use crate::wire::ValueCodec;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Port servers listen on for search requests, and the default beacon
/// destination.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5080;

/// Configuration for a client [`Context`](crate::client::Context).
///
/// Built with defaults via [`ClientConfig::new`] and refined with the
/// `with_*` methods:
///
/// ```rust
/// use cdap::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_handshake_timeout(Duration::from_secs(10))
///     .with_search_backoff(Duration::from_millis(100), Duration::from_secs(15));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Local address the shared discovery socket binds to.
    pub discovery_bind: SocketAddr,

    /// Destinations for broadcast search requests and beacon listening.
    pub broadcast_addresses: Vec<SocketAddr>,

    /// Servers searched directly, with the unicast flag set so they do not
    /// re-forward the request.
    pub unicast_addresses: Vec<SocketAddr>,

    /// Interval before the first search retry.
    pub search_backoff_floor: Duration,

    /// Largest interval between search retries.
    pub search_backoff_ceiling: Duration,

    /// Whether retry intervals are jittered to avoid synchronized bursts.
    pub search_jitter: bool,

    /// How long a new connection may spend in the validation handshake
    /// before it is abandoned.
    pub handshake_timeout: Duration,

    /// Receive buffer size announced to servers during validation.
    pub receive_buffer_size: u32,

    /// Introspection registry size announced to servers during validation.
    pub introspection_registry_max_size: u16,

    /// Largest inbound payload accepted before the reader discards the
    /// message.
    pub max_payload_size: usize,

    /// Quality-of-service bits announced during validation.
    pub qos: u16,

    /// Whether unicast search requests received by this client are
    /// re-broadcast on the local subnet for servers behind it.
    pub relay_enabled: bool,

    /// Authentication mechanisms in priority order.
    pub security_plugins: Vec<Arc<dyn SecurityPlugin>>,

    /// Decoder for typed payload values carried in search extras.
    pub value_codec: Option<Arc<dyn ValueCodec>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            broadcast_addresses: vec![SocketAddr::from((
                Ipv4Addr::BROADCAST,
                DEFAULT_DISCOVERY_PORT,
            ))],
            unicast_addresses: Vec::new(),
            search_backoff_floor: Duration::from_millis(250),
            search_backoff_ceiling: Duration::from_secs(30),
            search_jitter: true,
            handshake_timeout: Duration::from_secs(5),
            receive_buffer_size: 65_536,
            introspection_registry_max_size: 0x7FFF,
            max_payload_size: 16 * 1024 * 1024,
            qos: 0,
            relay_enabled: false,
            security_plugins: vec![Arc::new(AnonymousPlugin)],
            value_codec: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local bind address for the discovery socket.
    pub fn with_discovery_bind(mut self, address: SocketAddr) -> Self {
        self.discovery_bind = address;
        self
    }

    /// Replaces the broadcast search destinations.
    pub fn with_broadcast_addresses(mut self, addresses: Vec<SocketAddr>) -> Self {
        self.broadcast_addresses = addresses;
        self
    }

    /// Adds one server searched directly by unicast.
    pub fn add_unicast_address(mut self, address: SocketAddr) -> Self {
        self.unicast_addresses.push(address);
        self
    }

    /// Sets the search retry floor and ceiling.
    pub fn with_search_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.search_backoff_floor = floor;
        self.search_backoff_ceiling = ceiling;
        self
    }

    /// Enables or disables search retry jitter.
    pub fn with_search_jitter(mut self, jitter: bool) -> Self {
        self.search_jitter = jitter;
        self
    }

    /// Sets the validation handshake deadline.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the receive buffer size announced during validation.
    pub fn with_receive_buffer_size(mut self, size: u32) -> Self {
        self.receive_buffer_size = size;
        self
    }

    /// Sets the largest inbound payload the reader will buffer.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets the quality-of-service bits announced during validation.
    pub fn with_qos(mut self, qos: u16) -> Self {
        self.qos = qos;
        self
    }

    /// Enables re-broadcast of received unicast searches.
    pub fn with_relay_enabled(mut self, enabled: bool) -> Self {
        self.relay_enabled = enabled;
        self
    }

    /// Prepends an authentication mechanism. The newest plugin has the
    /// highest priority; the anonymous default remains the fallback.
    pub fn with_security_plugin(mut self, plugin: Arc<dyn SecurityPlugin>) -> Self {
        self.security_plugins.insert(0, plugin);
        self
    }

    /// Installs a decoder for typed payload values.
    pub fn with_value_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.value_codec = Some(codec);
        self
    }

    /// Checks the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// A description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.search_backoff_floor.is_zero() {
            return Err("search_backoff_floor must be greater than zero".to_string());
        }
        if self.search_backoff_floor > self.search_backoff_ceiling {
            return Err(format!(
                "search_backoff_floor ({:?}) exceeds search_backoff_ceiling ({:?})",
                self.search_backoff_floor, self.search_backoff_ceiling
            ));
        }
        if self.broadcast_addresses.is_empty() && self.unicast_addresses.is_empty() {
            return Err("at least one broadcast or unicast search address is required".to_string());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake_timeout must be greater than zero".to_string());
        }
        if self.security_plugins.is_empty() {
            return Err("at least one security plugin is required".to_string());
        }
        Ok(())
    }

    /// Picks the authentication mechanism to answer validation with: the
    /// first configured plugin the server offered, falling back to the
    /// highest-priority plugin when nothing matches or the offer is empty.
    ///
    /// None only when the plugin list is empty, which
    /// [`ClientConfig::validate`] rejects.
    pub fn select_plugin(&self, offered: &[&str]) -> Option<Arc<dyn SecurityPlugin>> {
        self.security_plugins
            .iter()
            .find(|plugin| offered.contains(&plugin.name()))
            .or_else(|| self.security_plugins.first())
            .cloned()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("discovery_bind", &self.discovery_bind)
            .field("broadcast_addresses", &self.broadcast_addresses)
            .field("unicast_addresses", &self.unicast_addresses)
            .field("search_backoff_floor", &self.search_backoff_floor)
            .field("search_backoff_ceiling", &self.search_backoff_ceiling)
            .field("search_jitter", &self.search_jitter)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field(
                "introspection_registry_max_size",
                &self.introspection_registry_max_size,
            )
            .field("max_payload_size", &self.max_payload_size)
            .field("qos", &self.qos)
            .field("relay_enabled", &self.relay_enabled)
            .field(
                "security_plugins",
                &self
                    .security_plugins
                    .iter()
                    .map(|plugin| plugin.name())
                    .collect::<Vec<_>>(),
            )
            .field("value_codec", &self.value_codec.is_some())
            .finish()
    }
}
