//! The session orchestrator.
//!
//! A [`Session`] owns at most one of three things at a time: a listener
//! task, a connector task, or a transfer engine for an adopted channel.
//! State, role, conversation and that one task change together under one
//! critical section, [`Core`]:
//!
//! ```text
//!              start()                 accept                 handshake
//!   (stopped) ────────→ Listening ───────────────→ Pending ─────────────→ Connected
//!                          │   ↑                      │                       │
//!                connect() │   │ teardown             │ lost / rejected       │ lost /
//!                          ↓   │                      ↓                       │ disconnect
//!                      Connecting ──── dial ok ────→ Pending                  │
//!                          │                                                  │
//!                          └──── dial failed ────→ NotConnected ──→ Listening ←┘
//! ```
//!
//! # Critical section
//!
//! Commands and task callbacks all lock `Core`. Nothing inside the lock
//! awaits another task: spawning, aborting and queueing are synchronous,
//! and observers are called later by the dispatcher task.
//!
//! # Generations
//!
//! Every cancel bumps `Core::generation`. A task carries the generation it
//! was started under, and its callbacks are ignored once that is stale.
//! This is how an explicit cancel is told apart from a channel that failed
//! on its own: only the latter reaches the session as a current event.

use std::path::Path;
use std::sync::{Arc, Weak};

use linkchat_protocol::{
    Frame, FrameType, LocalProfile, PayloadKind, TransferProtocol, Uid,
};
use linkchat_transfer::{
    CloseReason, EngineEvent, FileEvent, TransferEngine, TransferringFile,
};
use linkchat_transport::{PeerAddress, PeerInfo, Transport, TransportError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::collaborators::{Collaborators, Notification, NotificationKey};
use crate::dispatcher::{Dispatcher, Job};
use crate::machine::{Trigger, transition};
use crate::observer::{
    ConnectionObserver, FileObserver, MessageObserver, Observers,
    SubscriptionId,
};
use crate::tasks::{self, TaskHandle};
use crate::{
    ChatMessage, ConnectionEvent, ConnectionRole, ConnectionState,
    Conversation, MessageEvent, SessionConfig, SessionError,
};

/// Title of the service status notification.
const SERVICE_TITLE: &str = "linkchat";

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// The engine of an adopted channel and the task feeding its events back.
struct Link {
    engine: TransferEngine,
    _pump: TaskHandle,
}

/// The one task the session runs.
enum ActiveTask {
    Idle,
    Listening(TaskHandle),
    Connecting(TaskHandle),
    Transferring(Link),
}

/// Everything guarded by the session's critical section.
struct Core {
    running: bool,
    state: ConnectionState,
    role: Option<ConnectionRole>,
    conversation: Option<Conversation>,
    contract: TransferProtocol,
    generation: u64,
    task: ActiveTask,
    /// The last listener, aborted but maybe not finished yet. The next
    /// listener waits for it before opening its endpoint.
    retired_listener: Option<JoinHandle<()>>,
}

impl Core {
    fn new() -> Self {
        Self {
            running: false,
            state: ConnectionState::NotConnected,
            role: None,
            conversation: None,
            contract: TransferProtocol::new(),
            generation: 0,
            task: ActiveTask::Idle,
            retired_listener: None,
        }
    }

    fn link(&self) -> Option<&Link> {
        match &self.task {
            ActiveTask::Transferring(link) => Some(link),
            _ => None,
        }
    }

    fn peer(&self) -> Option<&PeerInfo> {
        self.link().map(|link| link.engine.peer())
    }

    /// The engine, if the session is in one of `states`.
    fn engine_in(
        &self,
        operation: &'static str,
        states: &[ConnectionState],
    ) -> Result<&TransferEngine, SessionError> {
        match self.link() {
            Some(link) if states.contains(&self.state) => Ok(&link.engine),
            _ => Err(SessionError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn is_incoming_request(&self) -> bool {
        self.state == ConnectionState::Pending
            && self.role == Some(ConnectionRole::Incoming)
            && self.conversation.is_some()
    }

    /// Applies `trigger` if it is valid from the current state.
    fn apply(&mut self, trigger: Trigger) -> bool {
        match transition(self.state, trigger) {
            Some(next) => {
                tracing::debug!(from = %self.state, to = %next, ?trigger, "state changed");
                self.state = next;
                true
            }
            None => {
                tracing::debug!(state = %self.state, ?trigger, "transition ignored");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inner
// ---------------------------------------------------------------------------

pub(crate) struct Inner<T: Transport> {
    me: Weak<Inner<T>>,
    transport: Arc<T>,
    config: SessionConfig,
    profile: LocalProfile,
    observers: Arc<Observers>,
    dispatcher: Dispatcher,
    core: Mutex<Core>,
}

impl<T: Transport> Inner<T> {
    // --- Task management (called with the core locked) ---

    /// Cancels whatever task runs. An adopted channel is closed: politely
    /// with `farewell` written first, or abruptly without one.
    fn cancel_task(&self, core: &mut Core, farewell: Option<Frame>) {
        core.generation += 1;
        match std::mem::replace(&mut core.task, ActiveTask::Idle) {
            ActiveTask::Idle => {}
            ActiveTask::Listening(handle) => {
                core.retired_listener = handle.retire();
            }
            ActiveTask::Connecting(handle) => drop(handle),
            ActiveTask::Transferring(link) => {
                if let Some(file) = link.engine.transferring_file() {
                    self.dispatcher
                        .send(Job::Dismiss(NotificationKey::Transfer(file.uid)));
                }
                let Link { engine, _pump } = link;
                match farewell {
                    Some(frame) => engine.close(Some(frame)),
                    None => drop(engine),
                }
            }
        }
    }

    /// Forgets everything about the last channel.
    fn clear_link_state(&self, core: &mut Core) {
        core.role = None;
        core.conversation = None;
        core.contract.reset();
    }

    /// Cancels the current task and starts a fresh listener, if running.
    fn prepare_for_listen(&self, core: &mut Core) {
        self.cancel_task(core, None);
        self.clear_link_state(core);
        if !core.running || !core.apply(Trigger::Listen) {
            return;
        }

        let handle = TaskHandle::spawn(tasks::listen(
            self.me.clone(),
            Arc::clone(&self.transport),
            core.generation,
            core.retired_listener.take(),
        ));
        core.task = ActiveTask::Listening(handle);
        tracing::info!(generation = core.generation, "listening");
        self.dispatcher.send(Job::Notify(
            NotificationKey::Service,
            Notification::new(SERVICE_TITLE, "Ready to connect"),
        ));
    }

    /// Tears the channel down after it failed or the peer broke the
    /// protocol, reports why, and listens again.
    fn connection_lost(&self, core: &mut Core) {
        let event = match (core.state, core.role) {
            (ConnectionState::Pending, Some(ConnectionRole::Incoming)) => {
                ConnectionEvent::Withdrawn
            }
            (ConnectionState::Pending | ConnectionState::Connected, _) => {
                ConnectionEvent::Lost
            }
            (state, _) => {
                tracing::debug!(%state, "channel gone outside a connection");
                self.prepare_for_listen(core);
                return;
            }
        };
        core.apply(Trigger::Drop);
        self.cancel_task(core, None);
        self.dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        self.dispatcher.connection(event);
        self.prepare_for_listen(core);
    }

    // --- Task callbacks ---

    pub(crate) async fn adopt<C>(
        &self,
        generation: u64,
        channel: C,
        role: ConnectionRole,
    ) where
        C: linkchat_transport::Channel,
    {
        let mut core = self.core.lock().await;
        if generation != core.generation || !core.running {
            tracing::debug!(generation, peer = %channel.peer().address, "stale channel closed");
            return;
        }
        let Some(next) = transition(core.state, Trigger::Adopt) else {
            tracing::debug!(state = %core.state, peer = %channel.peer().address, "occupied, channel closed");
            return;
        };

        // The caller is the task being retired here.
        self.cancel_task(&mut core, None);
        self.clear_link_state(&mut core);
        core.state = next;
        core.role = Some(role);

        let (engine, events) =
            TransferEngine::spawn(channel, &self.config.engine_config());
        let peer = engine.peer().clone();
        if role == ConnectionRole::Outgoing {
            let request = core.contract.connect_request(&self.profile);
            if let Err(e) = engine.send_frame(request) {
                tracing::warn!(peer = %peer.address, error = %e, "cannot send connect request");
            }
        }
        let pump = TaskHandle::spawn(tasks::pump(
            self.me.clone(),
            core.generation,
            events,
        ));
        core.task = ActiveTask::Transferring(Link {
            engine,
            _pump: pump,
        });

        tracing::info!(peer = %peer.address, ?role, generation = core.generation, "channel adopted");
        self.dispatcher.send(Job::Notify(
            NotificationKey::Service,
            Notification::new(
                SERVICE_TITLE,
                format!("Connected to {}", peer.device_name()),
            ),
        ));
        self.dispatcher.connection(ConnectionEvent::Connected(peer));
    }

    pub(crate) async fn dial_failed(
        &self,
        generation: u64,
        peer: &PeerAddress,
        error: TransportError,
    ) {
        let mut core = self.core.lock().await;
        if generation != core.generation {
            return;
        }
        tracing::warn!(%peer, error = %error, "connection attempt failed");
        if !core.apply(Trigger::DialFailed) {
            return;
        }
        self.cancel_task(&mut core, None);
        self.dispatcher.connection(ConnectionEvent::Failed);
        self.prepare_for_listen(&mut core);
    }

    pub(crate) async fn on_engine_event(&self, generation: u64, event: EngineEvent) {
        let mut core = self.core.lock().await;
        if generation != core.generation {
            tracing::trace!(generation, "stale engine event ignored");
            return;
        }
        match event {
            EngineEvent::FrameReceived(frame) => self.on_frame(&mut core, frame),
            EngineEvent::FrameSent(frame) => self.on_frame_sent(&core, frame),
            EngineEvent::File(event) => self.on_file_event(&core, event),
            EngineEvent::Closed(reason) => {
                match reason {
                    CloseReason::EndOfStream => {
                        tracing::info!(state = %core.state, "channel closed by peer");
                    }
                    CloseReason::Failed(e) => {
                        tracing::warn!(state = %core.state, error = %e, "channel failed");
                    }
                }
                self.connection_lost(&mut core);
            }
        }
    }

    // --- Inbound frames ---

    fn on_frame(&self, core: &mut Core, frame: Frame) {
        tracing::debug!(kind = ?frame.kind, uid = %frame.uid, flag = frame.flag, "frame received");
        match frame.kind {
            FrameType::ConnectRequest if frame.flag => self.on_connect_request(core, &frame),
            FrameType::ConnectRequest => self.on_peer_disconnect(core),
            FrameType::ConnectResponse => self.on_connect_response(core, &frame),
            FrameType::Message => self.on_message(core, frame),
            FrameType::Delivered => {
                let event = if frame.flag {
                    MessageEvent::Delivered(frame.uid)
                } else {
                    MessageEvent::NotDelivered(frame.uid)
                };
                self.dispatcher.send(Job::Message(event));
            }
            FrameType::Seen => {
                if frame.flag {
                    self.dispatcher.send(Job::Message(MessageEvent::Seen(frame.uid)));
                }
            }
            FrameType::FileStart | FrameType::FileEnd | FrameType::FileCancel => {
                tracing::debug!(kind = ?frame.kind, "file frame reached the session, ignored");
            }
        }
    }

    fn protocol_violation(&self, core: &mut Core, what: &str) {
        tracing::warn!(state = %core.state, role = ?core.role, what, "protocol violation");
        self.connection_lost(core);
    }

    fn on_connect_request(&self, core: &mut Core, frame: &Frame) {
        let expected = core.state == ConnectionState::Pending
            && core.role == Some(ConnectionRole::Incoming)
            && core.conversation.is_none();
        if !expected {
            return self.protocol_violation(core, "unexpected connect request");
        }
        let handshake = match frame.handshake() {
            Ok(handshake) => handshake,
            Err(e) => {
                tracing::warn!(error = %e, "bad connect request");
                return self.protocol_violation(core, "bad connect request");
            }
        };
        let Some(peer) = core.peer() else {
            return;
        };

        let conversation = Conversation::from_handshake(peer, handshake);
        core.contract.setup_with(conversation.protocol_version);
        core.conversation = Some(conversation.clone());
        tracing::info!(peer = %conversation.peer_address, name = %conversation.display_name, "connection requested");
        self.dispatcher.send(Job::StoreConversation(conversation.clone()));
        self.dispatcher.send(Job::ConnectionRequest(conversation));
    }

    fn on_connect_response(&self, core: &mut Core, frame: &Frame) {
        let expected = core.state == ConnectionState::Pending
            && core.role == Some(ConnectionRole::Outgoing);
        if !expected {
            return self.protocol_violation(core, "unexpected connect response");
        }

        if !frame.flag {
            tracing::info!("connection rejected by peer");
            core.apply(Trigger::Reject);
            self.cancel_task(core, None);
            self.dispatcher.connection(ConnectionEvent::Rejected);
            return self.prepare_for_listen(core);
        }

        let handshake = match frame.handshake() {
            Ok(handshake) => handshake,
            Err(e) => {
                tracing::warn!(error = %e, "bad connect response");
                return self.protocol_violation(core, "bad connect response");
            }
        };
        let Some(link) = core.link() else {
            return;
        };
        let conversation =
            Conversation::from_handshake(link.engine.peer(), handshake);
        link.engine.enable_files();
        core.contract.setup_with(conversation.protocol_version);
        core.conversation = Some(conversation.clone());
        core.apply(Trigger::Accept);

        tracing::info!(peer = %conversation.peer_address, name = %conversation.display_name, "connection accepted by peer");
        self.dispatcher.send(Job::StoreConversation(conversation.clone()));
        self.dispatcher.connection(ConnectionEvent::Accepted);
        self.dispatcher
            .connection(ConnectionEvent::ConnectedOutgoing(conversation));
    }

    fn on_peer_disconnect(&self, core: &mut Core) {
        if !core.state.has_channel() {
            return;
        }
        tracing::info!(state = %core.state, "peer disconnected");
        core.apply(Trigger::Drop);
        self.cancel_task(core, None);
        self.dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        self.dispatcher.connection(ConnectionEvent::Disconnected);
        self.prepare_for_listen(core);
    }

    fn on_message(&self, core: &mut Core, frame: Frame) {
        if core.state != ConnectionState::Connected {
            return self.protocol_violation(core, "message before handshake");
        }
        let Some(link) = core.link() else {
            return;
        };
        let uid = frame.uid;
        let message = ChatMessage::text(
            uid,
            link.engine.peer().address.clone(),
            false,
            frame.body,
        );
        if self.config.auto_delivery_receipts {
            if let Err(e) = link.engine.send_frame(core.contract.delivery(uid, true)) {
                tracing::debug!(%uid, error = %e, "delivery receipt not sent");
            }
        }
        self.dispatcher.send(Job::MessageReceived {
            message,
            conversation: core.conversation.clone(),
        });
    }

    fn on_frame_sent(&self, core: &Core, frame: Frame) {
        if frame.kind != FrameType::Message {
            return;
        }
        let Some(peer) = core.peer() else {
            return;
        };
        let message =
            ChatMessage::text(frame.uid, peer.address.clone(), true, frame.body);
        self.dispatcher.send(Job::MessageSent {
            message,
            conversation: core.conversation.clone(),
        });
    }

    fn on_file_event(&self, core: &Core, event: FileEvent) {
        let Some(peer) = core.peer() else {
            return;
        };
        self.dispatcher.send(Job::File {
            event,
            peer: peer.address.clone(),
            conversation: core.conversation.clone(),
        });
    }

    // --- Local answers to a connection request ---

    fn accept_with(&self, core: &mut Core, frame: Frame) -> Result<(), SessionError> {
        if !core.is_incoming_request() {
            return Err(SessionError::InvalidState {
                operation: "accept a connection",
                state: core.state,
            });
        }
        let engine = core.engine_in("accept a connection", &[ConnectionState::Pending])?;
        engine.send_frame(frame)?;
        engine.enable_files();
        core.apply(Trigger::Accept);
        tracing::info!(peer = ?core.conversation.as_ref().map(|c| &c.peer_address), "connection accepted");
        self.dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        Ok(())
    }

    fn reject_with(&self, core: &mut Core, frame: Frame) -> Result<(), SessionError> {
        if !core.is_incoming_request() {
            return Err(SessionError::InvalidState {
                operation: "reject a connection",
                state: core.state,
            });
        }
        tracing::info!(peer = ?core.conversation.as_ref().map(|c| &c.peer_address), "connection rejected");
        core.apply(Trigger::Reject);
        self.cancel_task(core, Some(frame));
        self.dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        self.prepare_for_listen(core);
        Ok(())
    }

    fn disconnect_with(&self, core: &mut Core, farewell: Option<Frame>) {
        match core.state {
            ConnectionState::Pending | ConnectionState::Connected => {
                tracing::info!(state = %core.state, "disconnecting");
                let farewell =
                    farewell.unwrap_or_else(|| core.contract.disconnect_request());
                self.cancel_task(core, Some(farewell));
            }
            ConnectionState::Connecting => {
                tracing::info!("connection attempt abandoned");
                self.cancel_task(core, None);
            }
            ConnectionState::NotConnected
            | ConnectionState::Listening
            | ConnectionState::Rejected => return,
        }
        core.apply(Trigger::Reset);
        self.dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        self.prepare_for_listen(core);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One point-to-point chat session over a [`Transport`].
///
/// Cheap to clone; clones share the same session. The session stops all
/// its tasks when the last clone is dropped.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), linkchat_session::SessionError> {
/// use linkchat_session::{Collaborators, Session, SessionConfig};
/// use linkchat_transport::MemoryNetwork;
///
/// let network = MemoryNetwork::new();
/// let session = Session::new(
///     network.transport("AA:01", "alice"),
///     SessionConfig::default(),
///     Collaborators::default(),
/// );
/// session.start().await;
/// session.connect("BB:02".into()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Session<T> {
    /// Creates a stopped session. Must be called from within a Tokio
    /// runtime: the dispatcher task starts right away.
    pub fn new(
        transport: T,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Self {
        let observers = Arc::new(Observers::default());
        let dispatcher = Dispatcher::spawn(Arc::clone(&observers), collaborators);
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            transport: Arc::new(transport),
            profile: config.profile(),
            config,
            observers,
            dispatcher,
            core: Mutex::new(Core::new()),
        });
        Self { inner }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // --- Lifecycle ---

    /// Starts listening for inbound connections. Does nothing if the
    /// session is already running.
    pub async fn start(&self) {
        let mut core = self.inner.core.lock().await;
        if core.running {
            return;
        }
        core.running = true;
        tracing::info!(name = %self.inner.profile.display_name, "session started");
        self.inner.prepare_for_listen(&mut core);
    }

    /// Cancels every task, closes any channel and reports
    /// [`ConnectionEvent::Destroyed`].
    pub async fn stop(&self) {
        let mut core = self.inner.core.lock().await;
        if !core.running {
            return;
        }
        core.running = false;
        self.inner.cancel_task(&mut core, None);
        self.inner.clear_link_state(&mut core);
        core.apply(Trigger::Reset);
        tracing::info!("session stopped");

        let dispatcher = &self.inner.dispatcher;
        dispatcher.send(Job::Dismiss(NotificationKey::ConnectionRequest));
        dispatcher.send(Job::Dismiss(NotificationKey::Service));
        dispatcher.connection(ConnectionEvent::Destroyed);
    }

    /// Dials `peer`, cancelling the listener or an earlier dial.
    ///
    /// # Errors
    /// - [`SessionError::NotRunning`] before `start()`.
    /// - [`SessionError::Busy`] while a channel is adopted.
    pub async fn connect(&self, peer: PeerAddress) -> Result<(), SessionError> {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        if !core.running {
            return Err(SessionError::NotRunning);
        }
        if core.state.has_channel() {
            return Err(SessionError::Busy(core.state));
        }
        let Some(next) = transition(core.state, Trigger::Dial) else {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: core.state,
            });
        };

        inner.cancel_task(&mut core, None);
        inner.clear_link_state(&mut core);
        core.state = next;
        let handle = TaskHandle::spawn(tasks::dial(
            inner.me.clone(),
            Arc::clone(&inner.transport),
            core.generation,
            peer.clone(),
        ));
        core.task = ActiveTask::Connecting(handle);

        tracing::info!(%peer, generation = core.generation, "connecting");
        inner.dispatcher.connection(ConnectionEvent::Connecting(peer));
        Ok(())
    }

    /// Tells the peer we are leaving, closes the channel and listens
    /// again. Also abandons a dial in progress. No local event is
    /// reported; the peer sees [`ConnectionEvent::Disconnected`].
    pub async fn disconnect(&self) {
        let mut core = self.inner.core.lock().await;
        self.inner.disconnect_with(&mut core, None);
    }

    // --- Messaging ---

    /// Sends a text message and returns its uid. Reported as
    /// [`MessageEvent::Sent`] once written.
    pub async fn send_message(
        &self,
        text: impl Into<String>,
    ) -> Result<Uid, SessionError> {
        let mut core = self.inner.core.lock().await;
        core.engine_in("send a message", &[ConnectionState::Connected])?;
        let frame = core.contract.message(text);
        let uid = frame.uid;
        core.engine_in("send a message", &[ConnectionState::Connected])?
            .send_frame(frame)?;
        Ok(uid)
    }

    /// Sends a control frame.
    ///
    /// A `ConnectResponse` answers a pending request (accept or reject by
    /// its flag) and a `ConnectRequest{flag=false}` disconnects; both have
    /// the same effect as the matching command. `Delivered` and `Seen`
    /// are written as they are.
    pub async fn send_control(&self, frame: Frame) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        self.send_control_locked(&mut core, frame)
    }

    fn send_control_locked(
        &self,
        core: &mut Core,
        frame: Frame,
    ) -> Result<(), SessionError> {
        let inner = &self.inner;
        match frame.kind {
            FrameType::ConnectResponse if frame.flag => inner.accept_with(core, frame),
            FrameType::ConnectResponse => inner.reject_with(core, frame),
            FrameType::ConnectRequest if !frame.flag => {
                inner.disconnect_with(core, Some(frame));
                Ok(())
            }
            FrameType::Delivered | FrameType::Seen => {
                core.engine_in(
                    "send a receipt",
                    &[ConnectionState::Pending, ConnectionState::Connected],
                )?
                .send_frame(frame)?;
                Ok(())
            }
            FrameType::ConnectRequest
            | FrameType::Message
            | FrameType::FileStart
            | FrameType::FileEnd
            | FrameType::FileCancel => Err(SessionError::NotAControlFrame(frame.kind)),
        }
    }

    /// Accepts the pending inbound request.
    pub async fn accept_connection(&self) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        let frame = core.contract.connect_response(&self.inner.profile, true);
        self.send_control_locked(&mut core, frame)
    }

    /// Rejects the pending inbound request. The answer is written before
    /// the channel closes.
    pub async fn reject_connection(&self) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        let frame = core.contract.connect_response(&self.inner.profile, false);
        self.send_control_locked(&mut core, frame)
    }

    /// Tells the peer its item `uid` has been seen.
    pub async fn mark_seen(&self, uid: Uid) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        let frame = core.contract.seen(uid);
        self.send_control_locked(&mut core, frame)
    }

    // --- Files ---

    /// Starts sending the file at `path`.
    ///
    /// # Errors
    /// - [`SessionError::File`] if `path` is not a readable regular file.
    /// - [`SessionError::TransferInProgress`] if a file is in flight in
    ///   either direction.
    pub async fn send_file(
        &self,
        path: impl AsRef<Path>,
        kind: PayloadKind,
    ) -> Result<TransferringFile, SessionError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(SessionError::File(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
            })?;

        let mut core = self.inner.core.lock().await;
        let Core { contract, task, state, .. } = &mut *core;
        let engine = match task {
            ActiveTask::Transferring(link) if *state == ConnectionState::Connected => {
                &link.engine
            }
            _ => {
                return Err(SessionError::InvalidState {
                    operation: "send a file",
                    state: *state,
                });
            }
        };
        let file = engine.send_file(contract, path, name, metadata.len(), kind)?;
        tracing::info!(uid = %file.uid, name = %file.name, size = file.size, "sending file");
        Ok(file)
    }

    /// Cancels the file in flight, in whichever direction.
    pub async fn cancel_file_transfer(&self) -> Result<TransferringFile, SessionError> {
        let core = self.inner.core.lock().await;
        let engine =
            core.engine_in("cancel a transfer", &[ConnectionState::Connected])?;
        Ok(engine.cancel_file(&core.contract)?)
    }

    /// The file in flight, if any.
    pub async fn transferring_file(&self) -> Option<TransferringFile> {
        let core = self.inner.core.lock().await;
        core.link().and_then(|link| link.engine.transferring_file())
    }

    // --- Queries ---

    pub async fn is_running(&self) -> bool {
        self.inner.core.lock().await.running
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.core.lock().await.state
    }

    pub async fn role(&self) -> Option<ConnectionRole> {
        self.inner.core.lock().await.role
    }

    /// The peer of the completed handshake, if any.
    pub async fn conversation(&self) -> Option<Conversation> {
        self.inner.core.lock().await.conversation.clone()
    }

    /// What the transport reported about the adopted channel's peer.
    pub async fn peer(&self) -> Option<PeerInfo> {
        self.inner.core.lock().await.peer().cloned()
    }

    // --- Observers ---

    pub fn subscribe_connection(
        &self,
        observer: impl ConnectionObserver,
    ) -> SubscriptionId {
        self.inner.observers.add_connection(Arc::new(observer))
    }

    pub fn subscribe_messages(
        &self,
        observer: impl MessageObserver,
    ) -> SubscriptionId {
        self.inner.observers.add_message(Arc::new(observer))
    }

    pub fn subscribe_files(&self, observer: impl FileObserver) -> SubscriptionId {
        self.inner.observers.add_file(Arc::new(observer))
    }

    /// Removes a subscription. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.remove(id)
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.profile.display_name)
            .finish_non_exhaustive()
    }
}
