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

//! Channel lifecycle.
//!
//! A [`Channel`] is the application's handle on one named server-side
//! resource. It moves through an explicit state machine; every transition
//! is guarded by the current state, so races between server-initiated and
//! application-initiated teardown resolve to exactly one outcome, and
//! every [`ChannelListener`] notification fires at most once per cause.
//!
//! Listener callbacks run after the state lock is released, so a listener
//! may call back into the channel or the context.

use crate::client::context::ContextCore;
use crate::client::id::{ChannelId, Ioid};
use crate::client::request::Requester;
use crate::error::ClientError;
use crate::transport::PeerTransport;
use crate::wire::{MessageWriter, Status};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Lifecycle states of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, not yet handed to the search manager.
    NeverConnected,
    /// Waiting for a server to answer a search request.
    Searching,
    /// Resolved to a server; transport validation or channel creation is
    /// in flight.
    Connecting,
    /// Created on the server; operations may be issued.
    Connected,
    /// The owning transport died; the channel will re-enter search.
    Disconnected,
    /// The server refused to create the channel. Terminal.
    Failed,
    /// Destroyed by the application or the server. Terminal.
    Destroyed,
}

impl ChannelState {
    /// Whether the channel can never leave this state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Destroyed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverConnected => write!(f, "never connected"),
            Self::Searching => write!(f, "searching"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Observer for channel lifecycle events. All methods default to no-ops,
/// so implementors override only what they care about.
pub trait ChannelListener: Send + Sync {
    /// The channel reached [`ChannelState::Connected`] with `sid`.
    fn connection_completed(&self, cid: ChannelId, sid: u32) {
        let _ = (cid, sid);
    }

    /// The channel lost its transport and will re-enter search.
    fn channel_disconnected(&self, cid: ChannelId) {
        let _ = cid;
    }

    /// The server refused to create the channel. Fired at most once.
    fn create_channel_failed(&self, cid: ChannelId, status: &Status) {
        let _ = (cid, status);
    }

    /// The server destroyed the channel unilaterally.
    fn channel_destroyed_on_server(&self, cid: ChannelId) {
        let _ = cid;
    }
}

/// What an application-initiated destroy has to clean up.
pub(crate) enum DestroyAction {
    /// Already in a terminal state; nothing to do.
    AlreadyDead,
    /// Only local state existed.
    Local,
    /// The server holds the channel; it must be told.
    Remote {
        sid: u32,
        transport: Arc<PeerTransport>,
    },
}

struct ChannelRuntime {
    state: ChannelState,
    sid: Option<u32>,
    transport: Option<Arc<PeerTransport>>,
}

/// One named resource on some server.
///
/// Obtained from [`Context::create_channel`](crate::client::Context::create_channel).
/// The handle stays valid through disconnects and reconnects; only
/// [`Channel::destroy`] or a server-side destroy ends it.
pub struct Channel {
    cid: ChannelId,
    name: String,
    listener: Arc<dyn ChannelListener>,
    context: Weak<ContextCore>,
    runtime: Mutex<ChannelRuntime>,
}

impl Channel {
    pub(crate) fn new(
        cid: ChannelId,
        name: String,
        listener: Arc<dyn ChannelListener>,
        context: Weak<ContextCore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cid,
            name,
            listener,
            context,
            runtime: Mutex::new(ChannelRuntime {
                state: ChannelState::NeverConnected,
                sid: None,
                transport: None,
            }),
        })
    }

    /// The client-assigned channel id.
    pub fn cid(&self) -> ChannelId {
        self.cid
    }

    /// The channel name being resolved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.runtime.lock().state
    }

    /// The server-assigned id, present only while connected.
    pub fn sid(&self) -> Option<u32> {
        self.runtime.lock().sid
    }

    /// Whether operations can currently be issued.
    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub(crate) fn transport(&self) -> Option<Arc<PeerTransport>> {
        self.runtime.lock().transport.clone()
    }

    /// Destroys the channel: cancels any pending search, releases the cid,
    /// and tells the server if it holds the channel. Idempotent.
    pub fn destroy(&self) {
        match self.context.upgrade() {
            Some(core) => core.destroy_channel(self),
            None => {
                self.destroy_local();
            }
        }
    }

    /// Issues an operation over the channel's transport.
    ///
    /// `encode` receives the server-assigned sid and the fresh ioid and
    /// writes the complete request into the [`MessageWriter`]. The
    /// requester is registered before `encode` runs and unregistered again
    /// if the send fails.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] unless the channel is
    /// [`ChannelState::Connected`]; [`ClientError::Closed`] if the owning
    /// context is gone; [`ClientError::Transport`] if the send fails.
    pub fn issue_request<F>(
        &self,
        requester: Arc<dyn Requester>,
        encode: F,
    ) -> Result<Ioid, ClientError>
    where
        F: FnOnce(u32, Ioid, &mut MessageWriter),
    {
        let (sid, transport) = {
            let runtime = self.runtime.lock();
            match (runtime.state, runtime.sid, runtime.transport.as_ref()) {
                (ChannelState::Connected, Some(sid), Some(transport)) => {
                    (sid, Arc::clone(transport))
                }
                (state, _, _) => {
                    return Err(ClientError::NotConnected {
                        cid: self.cid,
                        state,
                    })
                }
            }
        };
        let core = self.context.upgrade().ok_or(ClientError::Closed)?;

        let ioid = core.requests().register(requester, transport.id());
        let mut writer = MessageWriter::new();
        encode(sid, ioid, &mut writer);

        if let Err(error) = transport.send_message(&mut writer) {
            core.requests().complete(ioid);
            return Err(error.into());
        }
        Ok(ioid)
    }

    /// Moves a fresh or disconnected channel into search.
    pub(crate) fn searching(&self) -> bool {
        let mut runtime = self.runtime.lock();
        match runtime.state {
            ChannelState::NeverConnected | ChannelState::Disconnected => {
                runtime.state = ChannelState::Searching;
                true
            }
            _ => false,
        }
    }

    /// Moves a searching channel toward its resolved server.
    pub(crate) fn begin_connecting(&self) -> bool {
        let mut runtime = self.runtime.lock();
        if runtime.state == ChannelState::Searching {
            runtime.state = ChannelState::Connecting;
            true
        } else {
            false
        }
    }

    /// Binds a connecting channel to the transport its create request is
    /// being sent over, so transport loss before the create response still
    /// reaches this channel.
    pub(crate) fn creating(&self, transport: Arc<PeerTransport>) -> bool {
        let mut runtime = self.runtime.lock();
        if runtime.state == ChannelState::Connecting {
            runtime.transport = Some(transport);
            true
        } else {
            false
        }
    }

    /// Abandons a connection attempt and returns to searching. Unlike
    /// [`Channel::disconnected`] this fires no listener callback: the
    /// channel never reached [`ChannelState::Connected`].
    pub(crate) fn retry_search(&self) -> bool {
        let mut runtime = self.runtime.lock();
        if runtime.state == ChannelState::Connecting {
            runtime.state = ChannelState::Searching;
            runtime.sid = None;
            runtime.transport = None;
            true
        } else {
            false
        }
    }

    /// Records a successful create response. Guarded on
    /// [`ChannelState::Connecting`], so a response racing a destroy is
    /// refused.
    pub(crate) fn connection_completed(&self, sid: u32, transport: Arc<PeerTransport>) -> bool {
        let completed = {
            let mut runtime = self.runtime.lock();
            if runtime.state == ChannelState::Connecting {
                runtime.state = ChannelState::Connected;
                runtime.sid = Some(sid);
                runtime.transport = Some(transport);
                true
            } else {
                false
            }
        };
        if completed {
            self.listener.connection_completed(self.cid, sid);
        }
        completed
    }

    /// Records a create rejection. The channel becomes terminally
    /// [`ChannelState::Failed`] and the listener is told exactly once.
    pub(crate) fn create_failed(&self, status: &Status) -> bool {
        let failed = {
            let mut runtime = self.runtime.lock();
            if runtime.state.is_terminal() {
                false
            } else {
                runtime.state = ChannelState::Failed;
                runtime.sid = None;
                runtime.transport = None;
                true
            }
        };
        if failed {
            self.listener.create_channel_failed(self.cid, status);
        }
        failed
    }

    /// Records a server-initiated destroy. Idempotent against an
    /// application destroy racing it.
    pub(crate) fn destroyed_on_server(&self) -> bool {
        let destroyed = {
            let mut runtime = self.runtime.lock();
            if runtime.state == ChannelState::Destroyed {
                false
            } else {
                runtime.state = ChannelState::Destroyed;
                runtime.sid = None;
                runtime.transport = None;
                true
            }
        };
        if destroyed {
            self.listener.channel_destroyed_on_server(self.cid);
        }
        destroyed
    }

    /// Records loss of the owning transport.
    pub(crate) fn disconnected(&self) -> bool {
        let lost = {
            let mut runtime = self.runtime.lock();
            match runtime.state {
                ChannelState::Connecting | ChannelState::Connected => {
                    runtime.state = ChannelState::Disconnected;
                    runtime.sid = None;
                    runtime.transport = None;
                    true
                }
                _ => false,
            }
        };
        if lost {
            self.listener.channel_disconnected(self.cid);
        }
        lost
    }

    /// Application-initiated destroy. No listener notification; the caller
    /// asked for this.
    pub(crate) fn destroy_local(&self) -> DestroyAction {
        let mut runtime = self.runtime.lock();
        if runtime.state.is_terminal() {
            return DestroyAction::AlreadyDead;
        }
        debug!(cid = %self.cid, state = %runtime.state, "destroying channel");
        let action = match (runtime.state, runtime.sid, runtime.transport.take()) {
            (ChannelState::Connected, Some(sid), Some(transport)) => {
                DestroyAction::Remote { sid, transport }
            }
            _ => DestroyAction::Local,
        };
        runtime.state = ChannelState::Destroyed;
        runtime.sid = None;
        action
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runtime = self.runtime.lock();
        f.debug_struct("Channel")
            .field("cid", &self.cid)
            .field("name", &self.name)
            .field("state", &runtime.state)
            .field("sid", &runtime.sid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FrameSink, MessageOrigin, TransportError, TransportId};
    use crate::wire::MessageHeader;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Default)]
    struct RecordingListener {
        events: StdMutex<Vec<String>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ChannelListener for RecordingListener {
        fn connection_completed(&self, _cid: ChannelId, sid: u32) {
            self.events.lock().unwrap().push(format!("connected {sid}"));
        }

        fn channel_disconnected(&self, _cid: ChannelId) {
            self.events.lock().unwrap().push("disconnected".to_string());
        }

        fn create_channel_failed(&self, _cid: ChannelId, status: &Status) {
            self.events
                .lock()
                .unwrap()
                .push(format!("create failed: {status}"));
        }

        fn channel_destroyed_on_server(&self, _cid: ChannelId) {
            self.events
                .lock()
                .unwrap()
                .push("destroyed on server".to_string());
        }
    }

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn on_frame(&self, _origin: MessageOrigin, _header: MessageHeader, _payload: Bytes) {}

        async fn on_transport_closed(
            &self,
            _id: TransportId,
            _remote: SocketAddr,
            _error: Option<TransportError>,
        ) {
        }
    }

    fn channel(listener: Arc<RecordingListener>) -> Arc<Channel> {
        Channel::new(
            ChannelId::new(1),
            "device:temperature".to_string(),
            listener,
            Weak::new(),
        )
    }

    async fn live_transport() -> (Arc<PeerTransport>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = PeerTransport::connect(addr, 1024, Arc::new(NullSink))
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (transport, server)
    }

    #[tokio::test]
    async fn test_happy_path_reaches_connected() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(Arc::clone(&listener));
        assert_eq!(channel.state(), ChannelState::NeverConnected);

        assert!(channel.searching());
        assert!(channel.begin_connecting());
        let (transport, _server) = live_transport().await;
        assert!(channel.connection_completed(42, transport));

        assert!(channel.is_connected());
        assert_eq!(channel.sid(), Some(42));
        assert_eq!(listener.events(), vec!["connected 42"]);
    }

    #[tokio::test]
    async fn test_connection_completed_requires_connecting() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(Arc::clone(&listener));
        channel.searching();

        let (transport, _server) = live_transport().await;
        assert!(!channel.connection_completed(42, transport));
        assert_eq!(channel.state(), ChannelState::Searching);
        assert!(listener.events().is_empty());
    }

    #[test]
    fn test_create_failure_notifies_exactly_once() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(Arc::clone(&listener));
        channel.searching();
        channel.begin_connecting();

        let status = Status::error("no such record");
        assert!(channel.create_failed(&status));
        assert!(!channel.create_failed(&status));

        assert_eq!(channel.state(), ChannelState::Failed);
        assert!(channel.state().is_terminal());
        assert_eq!(listener.events().len(), 1);
    }

    #[tokio::test]
    async fn test_server_destroy_is_idempotent_against_local_destroy() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(Arc::clone(&listener));
        channel.searching();
        channel.begin_connecting();
        let (transport, _server) = live_transport().await;
        channel.connection_completed(7, transport);

        assert!(matches!(
            channel.destroy_local(),
            DestroyAction::Remote { sid: 7, .. }
        ));
        assert!(!channel.destroyed_on_server());
        assert!(matches!(channel.destroy_local(), DestroyAction::AlreadyDead));

        assert_eq!(channel.state(), ChannelState::Destroyed);
        assert_eq!(listener.events(), vec!["connected 7"]);
    }

    #[tokio::test]
    async fn test_disconnect_clears_runtime_and_allows_research() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(Arc::clone(&listener));
        channel.searching();
        channel.begin_connecting();
        let (transport, _server) = live_transport().await;
        channel.connection_completed(7, transport);

        assert!(channel.disconnected());
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert_eq!(channel.sid(), None);
        assert!(channel.transport().is_none());
        assert!(!channel.disconnected(), "second disconnect is a no-op");

        assert!(channel.searching());
        assert_eq!(channel.state(), ChannelState::Searching);
        assert_eq!(listener.events(), vec!["connected 7", "disconnected"]);
    }

    #[test]
    fn test_destroy_while_searching_needs_no_server() {
        let listener = Arc::new(RecordingListener::default());
        let channel = channel(listener);
        channel.searching();
        assert!(matches!(channel.destroy_local(), DestroyAction::Local));
        assert_eq!(channel.state(), ChannelState::Destroyed);
    }

    #[test]
    fn test_issue_request_refused_when_not_connected() {
        struct SilentRequester;
        impl Requester for SilentRequester {
            fn response(
                &self,
                _version: u8,
                _payload: &mut crate::wire::PayloadCursor<'_>,
            ) -> Result<crate::client::request::RequestDisposition, crate::wire::WireError>
            {
                Ok(crate::client::request::RequestDisposition::Complete)
            }
        }

        let listener = Arc::new(RecordingListener::default());
        let channel = channel(listener);
        channel.searching();

        let result = channel.issue_request(Arc::new(SilentRequester), |_, _, _| {});
        assert!(matches!(
            result,
            Err(ClientError::NotConnected {
                state: ChannelState::Searching,
                ..
            })
        ));
    }
}

// Made with Bob
