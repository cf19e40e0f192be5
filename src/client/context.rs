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

//! The client context: one engine owning the discovery socket, the stream
//! transport pool, the channel and request registries, and the inbound
//! command dispatch table.

use crate::client::channel::{Channel, ChannelListener, DestroyAction};
use crate::client::config::ClientConfig;
use crate::client::id::{ChannelId, CidGenerator, Ioid};
use crate::client::request::RequestRegistry;
use crate::discovery::{
    BeaconListener, BeaconRecord, BeaconTracker, SearchManager, ServerGuid, MAX_CHANNEL_NAME,
    SEARCH_PROTOCOL,
};
use crate::dispatch::DispatchTable;
use crate::error::ClientError;
use crate::transport::{
    DiscoveryTransport, FrameSink, MessageOrigin, PeerTransport, TransportError, TransportId,
    TransportPool,
};
use crate::wire::{command, MessageHeader, MessageWriter, PROTOCOL_VERSION};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Handle to a running client engine.
///
/// Creating a context binds the discovery socket and starts the search
/// retry task; everything else (stream connections, validation handshakes,
/// channel creation) happens on demand as servers answer. Dropping the
/// context tears all of it down; [`Context::close`] does the same but
/// waits for the transport pool to drain.
///
/// # Examples
///
/// ```rust,no_run
/// use cdap::client::{ClientConfig, Context};
/// use cdap::client::ChannelListener;
/// use std::sync::Arc;
///
/// struct Watcher;
/// impl ChannelListener for Watcher {}
///
/// # async fn run() -> Result<(), cdap::error::ClientError> {
/// let context = Context::new(ClientConfig::new()).await?;
/// let channel = context.create_channel("device:temperature", Arc::new(Watcher))?;
/// // ... issue requests once the channel connects ...
/// channel.destroy();
/// context.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Context {
    core: Arc<ContextCore>,
}

impl Context {
    /// Validates `config`, binds the discovery socket, and starts the
    /// search retry task.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] for an invalid configuration, or
    /// [`ClientError::Transport`] when the discovery socket cannot bind.
    pub async fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|reason| ClientError::Config { reason })?;

        let discovery = DiscoveryTransport::bind(config.discovery_bind).await?;
        let search = Arc::new(SearchManager::new(&config, discovery.local_addr().port()));

        let core = Arc::new_cyclic(|self_ref| ContextCore {
            self_ref: self_ref.clone(),
            config,
            discovery: Arc::clone(&discovery),
            search: Arc::clone(&search),
            beacons: BeaconTracker::new(),
            channels: ChannelRegistry::new(),
            requests: RequestRegistry::new(),
            pool: TransportPool::new(),
            table: DispatchTable::standard(),
            watched_servers: Mutex::new(HashSet::new()),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        discovery.start(Arc::clone(&core) as Arc<dyn FrameSink>);
        let search_task = tokio::spawn(Arc::clone(&search).run(
            Arc::clone(&discovery),
            core.config.broadcast_addresses.clone(),
            core.config.unicast_addresses.clone(),
        ));
        core.tasks.lock().push(search_task);

        info!(local = %discovery.local_addr(), "client context started");
        Ok(Self { core })
    }

    /// The configuration this context is running with.
    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// The local address of the shared discovery socket. Search responses
    /// are addressed here.
    pub fn discovery_address(&self) -> SocketAddr {
        self.core.discovery.local_addr()
    }

    /// Creates a channel and starts searching for its name.
    ///
    /// The channel connects in the background; `listener` is told when it
    /// does. The same name may be created any number of times, each with
    /// its own cid and its own lifecycle.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] once the context has been closed, and
    /// [`ClientError::InvalidName`] for an empty name or one longer than
    /// [`MAX_CHANNEL_NAME`](crate::discovery::MAX_CHANNEL_NAME) bytes.
    pub fn create_channel(
        &self,
        name: &str,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Arc<Channel>, ClientError> {
        if self.core.is_closed() {
            return Err(ClientError::Closed);
        }
        if name.is_empty() {
            return Err(ClientError::InvalidName {
                reason: "empty".to_string(),
            });
        }
        if name.len() > MAX_CHANNEL_NAME {
            return Err(ClientError::InvalidName {
                reason: format!("{} bytes, limit is {MAX_CHANNEL_NAME}", name.len()),
            });
        }
        let channel = self
            .core
            .channels
            .create(name, listener, Arc::downgrade(&self.core));
        channel.searching();
        self.core.search.register(channel.cid(), name);
        debug!(cid = %channel.cid(), name, "channel created");
        Ok(channel)
    }

    /// Cancels an in-flight request, telling its requester. Returns false
    /// when the ioid is unknown or already complete.
    pub fn cancel_request(&self, ioid: Ioid) -> bool {
        self.core.requests.cancel(ioid, &ClientError::Cancelled)
    }

    /// Snapshot of every server currently known through beacons.
    pub fn beacons(&self) -> Vec<BeaconRecord> {
        self.core.beacons.records()
    }

    /// Watches beacons from (`protocol`, `server`). Beacons from servers
    /// nobody watches are discarded.
    pub fn register_beacon_listener(
        &self,
        protocol: &str,
        server: SocketAddr,
        listener: Arc<dyn BeaconListener>,
    ) {
        self.core.beacons.register_listener(protocol, server, listener);
    }

    /// Removes a previously registered beacon listener.
    pub fn unregister_beacon_listener(
        &self,
        protocol: &str,
        server: SocketAddr,
        listener: &Arc<dyn BeaconListener>,
    ) {
        self.core
            .beacons
            .unregister_listener(protocol, server, listener);
    }

    /// Number of channels still searching for a server.
    pub fn pending_searches(&self) -> usize {
        self.core.search.pending_len()
    }

    /// Whether the context has been closed.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<ContextCore> {
        &self.core
    }

    /// Shuts the context down: stops searching, closes the discovery
    /// socket and every pooled transport, destroys remaining channels, and
    /// fails in-flight requests with [`ClientError::Closed`]. Idempotent.
    pub async fn close(&self) {
        self.core.begin_shutdown();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.core.begin_shutdown();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("local", &self.core.discovery.local_addr())
            .field("channels", &self.core.channels.len())
            .field("closed", &self.core.is_closed())
            .finish()
    }
}

/// Shared engine state behind a [`Context`] handle.
///
/// Reader tasks hold this through the [`FrameSink`] they deliver into, so
/// it outlives the handle; `self_ref` lets handlers spawn follow-up work
/// that needs an owning reference.
pub(crate) struct ContextCore {
    self_ref: Weak<ContextCore>,
    config: ClientConfig,
    discovery: Arc<DiscoveryTransport>,
    search: Arc<SearchManager>,
    beacons: BeaconTracker,
    channels: ChannelRegistry,
    requests: RequestRegistry,
    pool: TransportPool,
    table: DispatchTable,
    watched_servers: Mutex<HashSet<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ContextCore {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn search(&self) -> &SearchManager {
        &self.search
    }

    pub(crate) fn beacons(&self) -> &BeaconTracker {
        &self.beacons
    }

    pub(crate) fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub(crate) fn requests(&self) -> &RequestRegistry {
        &self.requests
    }

    pub(crate) fn discovery(&self) -> &DiscoveryTransport {
        &self.discovery
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Accepts one search response entry. The pending-search gate makes
    /// resolution at-most-once: retransmitted or duplicate responses for
    /// an already-resolved cid are dropped here.
    pub(crate) fn channel_resolved(
        &self,
        cid: ChannelId,
        sequence: u32,
        version: u8,
        server: SocketAddr,
        guid: ServerGuid,
        protocol: &str,
    ) {
        if protocol != SEARCH_PROTOCOL {
            debug!(%cid, protocol, "search response offers an unsupported protocol");
            return;
        }
        if !self.search.resolved(cid) {
            trace!(%cid, "search response for a cid not pending; ignored");
            return;
        }
        let Some(channel) = self.channels.get(cid) else {
            return;
        };
        let Some(core) = self.self_ref.upgrade() else {
            return;
        };
        debug!(%cid, %server, %guid, sequence, version, "channel resolved");
        let task = tokio::spawn(core.connect_channel(channel, server));
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Drives one resolved channel onto a validated transport and sends
    /// its create request. Any failure before the create response returns
    /// the channel to searching.
    async fn connect_channel(self: Arc<Self>, channel: Arc<Channel>, server: SocketAddr) {
        if !channel.begin_connecting() {
            trace!(cid = %channel.cid(), state = %channel.state(), "resolution arrived too late");
            return;
        }

        let sink = Arc::clone(&self) as Arc<dyn FrameSink>;
        let transport = match self
            .pool
            .get_or_connect(server, self.config.max_payload_size, sink)
            .await
        {
            Ok(transport) => transport,
            Err(error) => {
                warn!(cid = %channel.cid(), %server, %error, "connect failed");
                self.return_to_search(&channel);
                return;
            }
        };
        self.watch_server(server);

        match time::timeout(self.config.handshake_timeout, transport.validated()).await {
            Ok(Ok(())) => {}
            Ok(Err(status)) => {
                debug!(cid = %channel.cid(), %status, "transport failed validation");
                self.return_to_search(&channel);
                return;
            }
            Err(_) => {
                warn!(
                    %server,
                    timeout = ?self.config.handshake_timeout,
                    "validation handshake timed out"
                );
                self.pool.remove(server, transport.id());
                transport.close();
                self.return_to_search(&channel);
                return;
            }
        }

        // Bind before sending so transport loss between the create request
        // and its response still reaches this channel.
        if !channel.creating(Arc::clone(&transport)) {
            return;
        }
        let mut writer = MessageWriter::new();
        writer.start(PROTOCOL_VERSION, command::CREATE_CHANNEL);
        writer.put_u16(1);
        writer.put_u32(channel.cid().as_u32());
        writer.put_string(channel.name());
        if let Err(error) = transport.send_message(&mut writer) {
            debug!(cid = %channel.cid(), %error, "create request not sent");
            self.return_to_search(&channel);
        }
    }

    /// Puts a channel that failed to connect back into the search rotation.
    fn return_to_search(&self, channel: &Arc<Channel>) {
        if self.is_closed() {
            return;
        }
        if channel.retry_search() || channel.searching() {
            self.search.register(channel.cid(), channel.name());
        }
    }

    /// Starts watching beacons from `server` so a restart there re-checks
    /// its channels. One watcher per server for the context's lifetime.
    fn watch_server(&self, server: SocketAddr) {
        if !self.watched_servers.lock().insert(server) {
            return;
        }
        let listener = Arc::new(ContextBeaconListener {
            core: self.self_ref.clone(),
        });
        self.beacons
            .register_listener(SEARCH_PROTOCOL, server, listener);
    }

    /// Reacts to a server's changeCount moving: its state is stale, so the
    /// pooled transport is torn down and its channels go back to search.
    pub(crate) fn handle_server_change(&self, server: SocketAddr) {
        if self.is_closed() {
            return;
        }
        let Some(core) = self.self_ref.upgrade() else {
            return;
        };
        warn!(%server, "server state changed; revalidating its channels");
        tokio::spawn(async move {
            if let Some(transport) = core.pool.get(server) {
                core.pool.remove(server, transport.id());
                transport.close();
                core.cleanup_transport(transport.id());
            }
            core.search.boost();
        });
    }

    /// Finishes a rejected validation handshake: the transport is useless,
    /// so evict it and fail everything it carried.
    pub(crate) fn on_validation_failed(&self, transport: &Arc<PeerTransport>) {
        self.pool.remove(transport.remote(), transport.id());
        transport.close();
        self.cleanup_transport(transport.id());
    }

    /// Fails requests and disconnects channels owned by a dead transport.
    /// Disconnected channels re-enter the search rotation.
    fn cleanup_transport(&self, id: TransportId) {
        let failed = self
            .requests
            .fail_transport(id, &ClientError::Transport(TransportError::Closed));
        if failed > 0 {
            debug!(%id, failed, "failed in-flight requests on dead transport");
        }
        for channel in self.channels.on_transport(id) {
            channel.disconnected();
            if !self.is_closed() && channel.searching() {
                self.search.register(channel.cid(), channel.name());
            }
        }
    }

    /// Application-initiated channel destruction.
    pub(crate) fn destroy_channel(&self, channel: &Channel) {
        let cid = channel.cid();
        self.search.cancel(cid);
        self.channels.remove(cid);
        if let DestroyAction::Remote { sid, transport } = channel.destroy_local() {
            let mut writer = MessageWriter::new();
            writer.start(PROTOCOL_VERSION, command::DESTROY_CHANNEL);
            writer.put_u32(cid.as_u32());
            writer.put_u32(sid);
            if let Err(error) = transport.send_message(&mut writer) {
                debug!(%cid, %error, "destroy notification not sent");
            }
        }
    }

    /// Server-initiated channel destruction. Unknown cids are ignored; the
    /// server may be answering a destroy we already processed.
    pub(crate) fn on_channel_destroyed_by_server(&self, cid: ChannelId) {
        match self.channels.remove(cid) {
            Some(channel) => {
                self.search.cancel(cid);
                channel.destroyed_on_server();
            }
            None => debug!(%cid, "server destroyed an unregistered channel; ignored"),
        }
    }

    /// Synchronous teardown shared by [`Context::close`] and drop.
    pub(crate) fn begin_shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("closing client context");
        self.search.close();
        self.discovery.close();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for channel in self.channels.drain() {
            channel.destroy_local();
        }
        self.pool.close_all();
        self.requests.fail_all(&ClientError::Closed);
    }
}

impl fmt::Debug for ContextCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCore")
            .field("local", &self.discovery.local_addr())
            .field("channels", &self.channels.len())
            .field("requests", &self.requests.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl FrameSink for ContextCore {
    async fn on_frame(&self, origin: MessageOrigin, header: MessageHeader, payload: Bytes) {
        let Some(core) = self.self_ref.upgrade() else {
            return;
        };
        core.table.dispatch(&core, origin, header, payload).await;
    }

    async fn on_transport_closed(
        &self,
        id: TransportId,
        remote: SocketAddr,
        error: Option<TransportError>,
    ) {
        match &error {
            Some(error) => warn!(%id, %remote, %error, "server connection lost"),
            None => debug!(%id, %remote, "server closed connection"),
        }
        self.pool.remove(remote, id);
        self.cleanup_transport(id);
    }
}

/// Channels keyed by client id, sharing the cid allocator.
pub(crate) struct ChannelRegistry {
    by_cid: RwLock<HashMap<ChannelId, Arc<Channel>>>,
    cids: CidGenerator,
}

impl ChannelRegistry {
    fn new() -> Self {
        Self {
            by_cid: RwLock::new(HashMap::new()),
            cids: CidGenerator::new(),
        }
    }

    /// Allocates a cid and registers a new channel under it.
    fn create(
        &self,
        name: &str,
        listener: Arc<dyn ChannelListener>,
        context: Weak<ContextCore>,
    ) -> Arc<Channel> {
        let mut by_cid = self.by_cid.write();
        loop {
            let cid = self.cids.next();
            if let Entry::Vacant(slot) = by_cid.entry(cid) {
                let channel = Channel::new(cid, name.to_string(), listener, context);
                slot.insert(Arc::clone(&channel));
                return channel;
            }
        }
    }

    pub(crate) fn get(&self, cid: ChannelId) -> Option<Arc<Channel>> {
        self.by_cid.read().get(&cid).cloned()
    }

    fn remove(&self, cid: ChannelId) -> Option<Arc<Channel>> {
        self.by_cid.write().remove(&cid)
    }

    fn len(&self) -> usize {
        self.by_cid.read().len()
    }

    fn drain(&self) -> Vec<Arc<Channel>> {
        self.by_cid.write().drain().map(|(_, channel)| channel).collect()
    }

    /// Channels currently bound to transport `id`.
    fn on_transport(&self, id: TransportId) -> Vec<Arc<Channel>> {
        self.by_cid
            .read()
            .values()
            .filter(|channel| channel.transport().is_some_and(|t| t.id() == id))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.len())
            .finish()
    }
}

/// The context's own beacon watcher, registered per connected server.
struct ContextBeaconListener {
    core: Weak<ContextCore>,
}

impl BeaconListener for ContextBeaconListener {
    fn server_changed(&self, record: &BeaconRecord) {
        if let Some(core) = self.core.upgrade() {
            core.handle_server_change(record.server);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::channel::ChannelState;
    use crate::wire::HEADER_SIZE;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    struct NoopListener;
    impl ChannelListener for NoopListener {}

    async fn scratch_target() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn local_config(target: SocketAddr) -> ClientConfig {
        ClientConfig::new()
            .with_discovery_bind("127.0.0.1:0".parse().unwrap())
            .with_broadcast_addresses(vec![target])
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ClientConfig::new().with_broadcast_addresses(Vec::new());
        let error = Context::new(config).await.unwrap_err();
        assert!(matches!(error, ClientError::Config { .. }));
    }

    #[tokio::test]
    async fn test_create_channel_searches_and_destroy_stops() {
        let (receiver, target) = scratch_target().await;
        let context = Context::new(local_config(target)).await.unwrap();

        let channel = context
            .create_channel("stand:beam:current", Arc::new(NoopListener))
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Searching);
        assert_eq!(context.pending_searches(), 1);

        let mut buf = vec![0u8; 2048];
        let (n, _) = timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > HEADER_SIZE);
        assert_eq!(buf[1], command::SEARCH_REQUEST);

        channel.destroy();
        assert_eq!(channel.state(), ChannelState::Destroyed);
        assert_eq!(context.pending_searches(), 0);
        context.close().await;
    }

    #[tokio::test]
    async fn test_create_channel_rejects_bad_names() {
        let (_receiver, target) = scratch_target().await;
        let context = Context::new(local_config(target)).await.unwrap();

        let empty = context
            .create_channel("", Arc::new(NoopListener))
            .unwrap_err();
        assert!(matches!(empty, ClientError::InvalidName { .. }));

        let long = "n".repeat(MAX_CHANNEL_NAME + 1);
        let error = context
            .create_channel(&long, Arc::new(NoopListener))
            .unwrap_err();
        assert!(matches!(error, ClientError::InvalidName { .. }));
        assert_eq!(context.pending_searches(), 0, "rejected names never search");

        let longest = "n".repeat(MAX_CHANNEL_NAME);
        let channel = context
            .create_channel(&longest, Arc::new(NoopListener))
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Searching);
        assert_eq!(context.pending_searches(), 1);
        context.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_creation() {
        let (_receiver, target) = scratch_target().await;
        let context = Context::new(local_config(target)).await.unwrap();
        context.close().await;
        context.close().await;

        let error = context
            .create_channel("late:channel", Arc::new(NoopListener))
            .unwrap_err();
        assert!(matches!(error, ClientError::Closed));
        assert!(context.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_unknown_request_is_false() {
        let (_receiver, target) = scratch_target().await;
        let context = Context::new(local_config(target)).await.unwrap();
        assert!(!context.cancel_request(Ioid::new(42)));
        context.close().await;
    }
}

// Made with Bob
