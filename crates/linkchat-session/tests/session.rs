//! Integration tests for the session orchestrator.
//!
//! Sessions run over a `MemoryNetwork`. Scenarios that need exact control
//! of the wire use a `RawPeer` instead of a second session: it dials like a
//! device would and then reads and writes frames and chunks by hand.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use linkchat_protocol::{
    CHUNK_TAG, Frame, FrameCodec, FrameType, JsonCodec, PayloadKind, Uid,
    chunk_header, chunk_len,
};
use linkchat_session::{
    ChatMessage, CollaboratorError, Collaborators, ConnectionEvent,
    ConnectionRole, ConnectionState, Conversation, FileEvent, MessageEvent,
    MessageStore, Notification, NotificationKey, NotificationSink, Session,
    SessionConfig, SessionError, SessionEvent,
};
use linkchat_transfer::TransferDirection;
use linkchat_transport::{
    Channel, Listener, MemoryChannel, MemoryNetwork, MemoryTransport,
    PeerAddress, Transport,
};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Helpers
// =========================================================================

struct Peer {
    session: Session<MemoryTransport>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    address: PeerAddress,
    dir: TempDir,
}

fn peer(net: &MemoryNetwork, address: &str, name: &str) -> Peer {
    peer_with(net, address, name, Collaborators::default(), 1024)
}

fn peer_with(
    net: &MemoryNetwork,
    address: &str,
    name: &str,
    collaborators: Collaborators,
    chunk_size: usize,
) -> Peer {
    let dir = TempDir::new().unwrap();
    let config = SessionConfig {
        display_name: name.to_string(),
        color: 0x00FF_0000,
        files_directory: dir.path().to_path_buf(),
        chunk_size,
        ..SessionConfig::default()
    };
    let session =
        Session::new(net.transport(address, name), config, collaborators);
    let (tx, events) = mpsc::unbounded_channel();
    session.subscribe_connection(tx.clone());
    session.subscribe_messages(tx.clone());
    session.subscribe_files(tx);
    Peer {
        session,
        events,
        address: PeerAddress::from(address),
        dir,
    }
}

impl Peer {
    async fn next(&mut self) -> SessionEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream closed")
    }

    /// Skips events until one matches `pred`.
    async fn wait_for(
        &mut self,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        loop {
            let event = self.next().await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn next_connection(&mut self) -> ConnectionEvent {
        loop {
            if let SessionEvent::Connection(event) = self.next().await {
                return event;
            }
        }
    }

    async fn next_file(&mut self) -> FileEvent {
        loop {
            if let SessionEvent::File(event) = self.next().await {
                return event;
            }
        }
    }

    async fn next_message(&mut self) -> MessageEvent {
        loop {
            if let SessionEvent::Message(event) = self.next().await {
                return event;
            }
        }
    }

    async fn wait_state(&self, state: ConnectionState) {
        timeout(WAIT, async {
            while self.session.state().await != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {state}"));
    }

    /// Everything already queued, without waiting.
    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

async fn wait_listening(net: &MemoryNetwork, address: &PeerAddress) {
    timeout(WAIT, async {
        while !net.is_listening(address) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{address} never started listening"));
}

fn is_connected_incoming(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::Connection(ConnectionEvent::ConnectedIncoming(_))
    )
}

fn is_connected_outgoing(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::Connection(ConnectionEvent::ConnectedOutgoing(_))
    )
}

/// Starts both sessions and runs a full handshake, `alice` dialing.
async fn connected_pair(net: &MemoryNetwork) -> (Peer, Peer) {
    let mut alice = peer(net, "AA:01", "Alice");
    let mut bob = peer(net, "BB:02", "Bob");
    alice.session.start().await;
    bob.session.start().await;
    wait_listening(net, &bob.address).await;

    alice.session.connect(bob.address.clone()).await.unwrap();
    bob.wait_for(is_connected_incoming).await;
    bob.session.accept_connection().await.unwrap();
    alice.wait_for(is_connected_outgoing).await;

    alice.wait_state(ConnectionState::Connected).await;
    bob.wait_state(ConnectionState::Connected).await;
    (alice, bob)
}

#[derive(Debug, PartialEq)]
enum Wire {
    Frame(Frame),
    Chunk(Vec<u8>),
}

/// A device driven by hand at the byte level.
struct RawPeer {
    reader: BufReader<<MemoryChannel as Channel>::Reader>,
    writer: <MemoryChannel as Channel>::Writer,
    codec: FrameCodec<JsonCodec>,
}

impl RawPeer {
    async fn dial(
        net: &MemoryNetwork,
        address: &str,
        capacity: usize,
        target: &PeerAddress,
    ) -> Self {
        let transport = net.transport(address, "Raw").with_capacity(capacity);
        let channel = transport.dial(target).await.unwrap();
        let (reader, writer) = channel.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            codec: FrameCodec::new(JsonCodec),
        }
    }

    async fn send(&mut self, frame: &Frame) {
        let record = self.codec.encode(frame).unwrap();
        self.writer.write_all(&record).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send_chunk(&mut self, data: &[u8]) {
        self.writer
            .write_all(&chunk_header(data.len() as u32))
            .await
            .unwrap();
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn next(&mut self) -> Option<Wire> {
        timeout(WAIT, self.next_inner())
            .await
            .expect("raw peer read timed out")
    }

    async fn next_inner(&mut self) -> Option<Wire> {
        let first = *self.reader.fill_buf().await.ok()?.first()?;
        if first == CHUNK_TAG {
            let mut header = [0u8; 5];
            self.reader.read_exact(&mut header).await.unwrap();
            let len =
                chunk_len([header[1], header[2], header[3], header[4]]) as usize;
            let mut data = vec![0u8; len];
            self.reader.read_exact(&mut data).await.unwrap();
            Some(Wire::Chunk(data))
        } else {
            let mut record = Vec::new();
            self.reader.read_until(b'\n', &mut record).await.unwrap();
            Some(Wire::Frame(self.codec.decode(&record).unwrap()))
        }
    }

    /// Next frame of the given kind, skipping everything else.
    async fn frame_of(&mut self, kind: FrameType) -> Frame {
        loop {
            match self.next().await {
                Some(Wire::Frame(frame)) if frame.kind == kind => return frame,
                Some(_) => {}
                None => panic!("channel closed while waiting for {kind:?}"),
            }
        }
    }
}

/// Dials `target` as a raw device and completes the handshake from the
/// dialing side. The session must accept.
async fn raw_connected(
    net: &MemoryNetwork,
    target: &mut Peer,
    capacity: usize,
) -> RawPeer {
    target.session.start().await;
    wait_listening(net, &target.address).await;
    let mut raw = RawPeer::dial(net, "CC:03", capacity, &target.address).await;
    raw.send(&Frame::new(
        FrameType::ConnectRequest,
        Uid::NONE,
        true,
        "Carol#255#1",
    ))
    .await;
    target.wait_for(is_connected_incoming).await;
    target.session.accept_connection().await.unwrap();
    let response = raw.frame_of(FrameType::ConnectResponse).await;
    assert!(response.flag);
    raw
}

fn write_file(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_start_listens_for_inbound_channels() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");
    assert_eq!(alice.session.state().await, ConnectionState::NotConnected);

    alice.session.start().await;

    assert!(alice.session.is_running().await);
    assert_eq!(alice.session.state().await, ConnectionState::Listening);
    wait_listening(&net, &alice.address).await;
}

#[tokio::test]
async fn test_stop_reports_destroyed_and_closes_listener() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    wait_listening(&net, &alice.address).await;

    alice.session.stop().await;

    assert_eq!(alice.next_connection().await, ConnectionEvent::Destroyed);
    assert_eq!(alice.session.state().await, ConnectionState::NotConnected);
    timeout(WAIT, async {
        while net.is_listening(&alice.address) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_restart_after_stop_listens_again() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    alice.session.stop().await;

    alice.session.start().await;

    assert_eq!(alice.session.state().await, ConnectionState::Listening);
    wait_listening(&net, &alice.address).await;
}

#[tokio::test]
async fn test_connect_before_start_is_not_running() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");

    let result = alice.session.connect("BB:02".into()).await;

    assert!(matches!(result, Err(SessionError::NotRunning)));
    assert_eq!(alice.session.state().await, ConnectionState::NotConnected);
}

#[tokio::test]
async fn test_connect_unreachable_fails_then_listens() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;

    alice.session.connect("ZZ:99".into()).await.unwrap();

    assert_eq!(
        alice.next_connection().await,
        ConnectionEvent::Connecting("ZZ:99".into())
    );
    assert_eq!(alice.next_connection().await, ConnectionEvent::Failed);
    alice.wait_state(ConnectionState::Listening).await;
    wait_listening(&net, &alice.address).await;
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_inbound_request_builds_conversation() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    wait_listening(&net, &alice.address).await;

    let mut raw = RawPeer::dial(&net, "BB:02", 64 * 1024, &alice.address).await;

    let ConnectionEvent::Connected(info) = alice.next_connection().await else {
        panic!("expected Connected");
    };
    assert_eq!(info.address, PeerAddress::from("BB:02"));
    assert_eq!(alice.session.state().await, ConnectionState::Pending);
    assert_eq!(alice.session.role().await, Some(ConnectionRole::Incoming));
    assert_eq!(alice.session.conversation().await, None);

    raw.send(&Frame::new(
        FrameType::ConnectRequest,
        Uid::NONE,
        true,
        "Bob#16711680#1",
    ))
    .await;

    let ConnectionEvent::ConnectedIncoming(conversation) =
        alice.next_connection().await
    else {
        panic!("expected ConnectedIncoming");
    };
    assert_eq!(conversation.display_name, "Bob");
    assert_eq!(conversation.color, 16711680);
    assert_eq!(conversation.protocol_version, 1);
    assert_eq!(conversation.device_name, "Raw");
    assert_eq!(alice.session.conversation().await, Some(conversation));
    assert_eq!(alice.session.state().await, ConnectionState::Pending);
}

#[tokio::test]
async fn test_mark_seen_writes_seen_frame() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");

    let mut raw = raw_connected(&net, &mut alice, 64 * 1024).await;

    assert_eq!(alice.session.state().await, ConnectionState::Connected);
    // The response was already consumed by the helper; a seen receipt
    // proves the channel is live in both directions.
    alice.session.mark_seen(Uid(9)).await.unwrap();
    let seen = raw.frame_of(FrameType::Seen).await;
    assert_eq!(seen.uid, Uid(9));
    assert!(seen.flag);
}

#[tokio::test]
async fn test_outbound_handshake_sends_request_with_profile() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;

    // A bare listener stands in for the peer device.
    let device = net.transport("BB:02", "Bob");
    let mut listener = device.listen().await.unwrap();
    alice.session.connect("BB:02".into()).await.unwrap();
    let channel = listener.accept().await.unwrap();
    let (reader, mut writer) = channel.into_split();
    let mut reader = BufReader::new(reader);
    let codec = FrameCodec::new(JsonCodec);

    let mut record = Vec::new();
    timeout(WAIT, reader.read_until(b'\n', &mut record))
        .await
        .unwrap()
        .unwrap();
    let request = codec.decode(&record).unwrap();
    assert_eq!(request.kind, FrameType::ConnectRequest);
    assert!(request.flag);
    assert_eq!(request.body, "Alice#16711680#1");
    assert_eq!(alice.session.role().await, Some(ConnectionRole::Outgoing));

    let response = Frame::new(
        FrameType::ConnectResponse,
        Uid::NONE,
        true,
        "Bob#255",
    );
    writer.write_all(&codec.encode(&response).unwrap()).await.unwrap();
    writer.flush().await.unwrap();

    assert_eq!(
        alice.next_connection().await,
        ConnectionEvent::Connecting("BB:02".into())
    );
    assert!(matches!(
        alice.next_connection().await,
        ConnectionEvent::Connected(_)
    ));
    assert_eq!(alice.next_connection().await, ConnectionEvent::Accepted);
    let ConnectionEvent::ConnectedOutgoing(conversation) =
        alice.next_connection().await
    else {
        panic!("expected ConnectedOutgoing");
    };
    // A two-field handshake comes from a peer that predates versioning.
    assert_eq!(conversation.protocol_version, 0);
    assert_eq!(conversation.display_name, "Bob");
    assert_eq!(alice.session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_file_right_behind_accept_is_received() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;

    let device = net.transport("BB:02", "Bob");
    let mut listener = device.listen().await.unwrap();
    alice.session.connect("BB:02".into()).await.unwrap();
    let channel = listener.accept().await.unwrap();
    let (reader, mut writer) = channel.into_split();
    let mut reader = BufReader::new(reader);
    let codec = FrameCodec::new(JsonCodec);
    let mut record = Vec::new();
    timeout(WAIT, reader.read_until(b'\n', &mut record))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(codec.decode(&record).unwrap().kind, FrameType::ConnectRequest);

    // The accepting device is already connected and sends a file at once.
    let mut burst = codec
        .encode(&Frame::new(FrameType::ConnectResponse, Uid::NONE, true, "Bob#255#1"))
        .unwrap();
    burst.extend(
        codec
            .encode(&Frame::new(FrameType::FileStart, Uid(1), false, "a.txt#3#FILE"))
            .unwrap(),
    );
    burst.extend(chunk_header(3));
    burst.extend(b"abc");
    burst.extend(
        codec
            .encode(&Frame::new(FrameType::FileEnd, Uid(1), false, ""))
            .unwrap(),
    );
    writer.write_all(&burst).await.unwrap();
    writer.flush().await.unwrap();

    alice.wait_for(is_connected_outgoing).await;
    let event = alice
        .wait_for(|e| {
            matches!(
                e,
                SessionEvent::File(FileEvent::ReceivingFinished(_))
                    | SessionEvent::Connection(ConnectionEvent::Lost)
            )
        })
        .await;
    let SessionEvent::File(FileEvent::ReceivingFinished(file)) = event else {
        panic!("expected the file, got {event:?}");
    };
    assert_eq!(std::fs::read(&file.local_path).unwrap(), b"abc");
    assert_eq!(alice.session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_two_sessions_complete_handshake() {
    let net = MemoryNetwork::new();
    let (alice, bob) = connected_pair(&net).await;

    let at_alice = alice.session.conversation().await.unwrap();
    let at_bob = bob.session.conversation().await.unwrap();
    assert_eq!(at_alice.display_name, "Bob");
    assert_eq!(at_alice.peer_address, bob.address);
    assert_eq!(at_bob.display_name, "Alice");
    assert_eq!(at_bob.peer_address, alice.address);
    assert_eq!(alice.session.role().await, Some(ConnectionRole::Outgoing));
    assert_eq!(bob.session.role().await, Some(ConnectionRole::Incoming));
}

#[tokio::test]
async fn test_reject_connection_notifies_dialer_and_both_listen() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut bob = peer(&net, "BB:02", "Bob");
    alice.session.start().await;
    bob.session.start().await;
    wait_listening(&net, &bob.address).await;

    alice.session.connect(bob.address.clone()).await.unwrap();
    bob.wait_for(is_connected_incoming).await;
    bob.session.reject_connection().await.unwrap();

    alice
        .wait_for(|e| {
            matches!(e, SessionEvent::Connection(ConnectionEvent::Rejected))
        })
        .await;
    alice.wait_state(ConnectionState::Listening).await;
    bob.wait_state(ConnectionState::Listening).await;
    wait_listening(&net, &alice.address).await;
    wait_listening(&net, &bob.address).await;
    assert_eq!(alice.session.conversation().await, None);
}

#[tokio::test]
async fn test_accept_without_request_is_invalid_state() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;

    let result = alice.session.accept_connection().await;

    assert!(matches!(
        result,
        Err(SessionError::InvalidState {
            state: ConnectionState::Listening,
            ..
        })
    ));
}

#[tokio::test]
async fn test_connect_while_connected_is_busy() {
    let net = MemoryNetwork::new();
    let (alice, bob) = connected_pair(&net).await;

    let result = alice.session.connect(bob.address.clone()).await;

    assert!(matches!(
        result,
        Err(SessionError::Busy(ConnectionState::Connected))
    ));
    assert_eq!(alice.session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_send_control_refuses_payload_frames() {
    let net = MemoryNetwork::new();
    let (alice, _bob) = connected_pair(&net).await;

    let frame = Frame::new(FrameType::Message, Uid(1), false, "sneaky");
    let result = alice.session.send_control(frame).await;

    assert!(matches!(
        result,
        Err(SessionError::NotAControlFrame(FrameType::Message))
    ));
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_disconnect_notifies_peer_and_both_listen() {
    let net = MemoryNetwork::new();
    let (mut alice, mut bob) = connected_pair(&net).await;
    alice.drain();

    alice.session.disconnect().await;

    bob.wait_for(|e| {
        matches!(e, SessionEvent::Connection(ConnectionEvent::Disconnected))
    })
    .await;
    alice.wait_state(ConnectionState::Listening).await;
    bob.wait_state(ConnectionState::Listening).await;
    wait_listening(&net, &alice.address).await;
    wait_listening(&net, &bob.address).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let local: Vec<_> = alice
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Connection(_)))
        .collect();
    assert!(local.is_empty(), "local disconnect reported {local:?}");
}

#[tokio::test]
async fn test_unexpected_close_reports_lost_once_and_listens() {
    let net = MemoryNetwork::new();
    let (mut alice, mut bob) = connected_pair(&net).await;
    alice.drain();

    bob.session.stop().await;

    bob.wait_for(|e| {
        matches!(e, SessionEvent::Connection(ConnectionEvent::Destroyed))
    })
    .await;
    assert_eq!(alice.next_connection().await, ConnectionEvent::Lost);
    alice.wait_state(ConnectionState::Listening).await;
    wait_listening(&net, &alice.address).await;
    assert_eq!(alice.session.conversation().await, None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let lost = alice
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Connection(ConnectionEvent::Lost)))
        .count();
    assert_eq!(lost, 0);
}

#[tokio::test]
async fn test_pending_request_dropped_reports_withdrawn() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    wait_listening(&net, &alice.address).await;

    let mut raw = RawPeer::dial(&net, "BB:02", 64 * 1024, &alice.address).await;
    raw.send(&Frame::new(FrameType::ConnectRequest, Uid::NONE, true, "Bob#1#1"))
        .await;
    alice.wait_for(is_connected_incoming).await;

    drop(raw);

    assert_eq!(alice.next_connection().await, ConnectionEvent::Withdrawn);
    alice.wait_state(ConnectionState::Listening).await;
}

#[tokio::test]
async fn test_message_before_handshake_tears_channel_down() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    wait_listening(&net, &alice.address).await;

    let mut raw = RawPeer::dial(&net, "BB:02", 64 * 1024, &alice.address).await;
    raw.send(&Frame::new(FrameType::Message, Uid(1), false, "too early"))
        .await;

    alice
        .wait_for(|e| {
            matches!(e, SessionEvent::Connection(ConnectionEvent::Withdrawn))
        })
        .await;
    alice.wait_state(ConnectionState::Listening).await;
    assert_eq!(raw.next().await, None);
}

#[tokio::test]
async fn test_bad_handshake_body_tears_channel_down() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;
    wait_listening(&net, &alice.address).await;

    let mut raw = RawPeer::dial(&net, "BB:02", 64 * 1024, &alice.address).await;
    raw.send(&Frame::new(
        FrameType::ConnectRequest,
        Uid::NONE,
        true,
        "Bob#not-a-color#1",
    ))
    .await;

    alice
        .wait_for(|e| {
            matches!(e, SessionEvent::Connection(ConnectionEvent::Withdrawn))
        })
        .await;
    alice.wait_state(ConnectionState::Listening).await;
}

#[tokio::test]
async fn test_peer_disconnect_notice_reports_disconnected() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut raw = raw_connected(&net, &mut alice, 64 * 1024).await;

    raw.send(&Frame::control(FrameType::ConnectRequest, false)).await;

    alice
        .wait_for(|e| {
            matches!(e, SessionEvent::Connection(ConnectionEvent::Disconnected))
        })
        .await;
    alice.wait_state(ConnectionState::Listening).await;
}

/// An inbound channel arrives while `connect()` runs. Exactly one channel
/// is adopted and the other is closed without a byte written to it.
#[tokio::test]
async fn test_inbound_racing_connect_adopts_exactly_one_channel() {
    for _ in 0..20 {
        let net = MemoryNetwork::new();
        let mut alice = peer(&net, "AA:01", "Alice");
        alice.session.start().await;
        wait_listening(&net, &alice.address).await;
        let device = net.transport("BB:02", "Bob");
        let mut device_listener = device.listen().await.unwrap();
        let raw = net.transport("CC:03", "Raw");

        let (dialed, connected) = tokio::join!(
            raw.dial(&alice.address),
            alice.session.connect("BB:02".into()),
        );
        alice.wait_state(ConnectionState::Pending).await;

        // Held until the events are checked, so nothing is lost meanwhile.
        let mut device_end = None;
        match alice.session.role().await {
            Some(ConnectionRole::Incoming) => {
                // The inbound channel won; the dial never started.
                assert!(matches!(
                    connected,
                    Err(SessionError::Busy(ConnectionState::Pending))
                ));
                assert!(dialed.is_ok());
                let nothing = timeout(
                    Duration::from_millis(50),
                    device_listener.accept(),
                )
                .await;
                assert!(nothing.is_err(), "dial reached the device anyway");
            }
            Some(ConnectionRole::Outgoing) => {
                connected.unwrap();
                let channel = timeout(WAIT, device_listener.accept())
                    .await
                    .unwrap()
                    .unwrap();
                let (reader, writer) = channel.into_split();
                let mut reader = BufReader::new(reader);
                let mut record = Vec::new();
                timeout(WAIT, reader.read_until(b'\n', &mut record))
                    .await
                    .unwrap()
                    .unwrap();
                assert!(!record.is_empty());
                device_end = Some((reader, writer));

                // The losing inbound channel, if the dial got through at
                // all, is closed untouched.
                if let Ok(channel) = dialed {
                    let (mut reader, _writer) = channel.into_split();
                    let mut buf = [0u8; 64];
                    let read = timeout(WAIT, reader.read(&mut buf))
                        .await
                        .unwrap()
                        .unwrap_or(0);
                    assert_eq!(read, 0);
                }
            }
            None => panic!("pending without a role"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let connections: Vec<ConnectionEvent> = alice
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Connection(event) => Some(event),
                _ => None,
            })
            .collect();
        let adopted = connections
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Connected(_)))
            .count();
        assert_eq!(adopted, 1, "events: {connections:?}");
        assert!(!connections.iter().any(|e| matches!(
            e,
            ConnectionEvent::Lost | ConnectionEvent::Failed | ConnectionEvent::Withdrawn
        )));
        drop(device_end);
    }
}

/// Both sides dial each other at once. Whatever wins, neither session may
/// end up holding a channel the other does not hold.
#[tokio::test]
async fn test_simultaneous_connect_settles_consistently() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");
    let bob = peer(&net, "BB:02", "Bob");
    alice.session.start().await;
    bob.session.start().await;
    wait_listening(&net, &alice.address).await;
    wait_listening(&net, &bob.address).await;

    let (a, b) = tokio::join!(
        alice.session.connect(bob.address.clone()),
        bob.session.connect(alice.address.clone()),
    );
    for result in [a, b] {
        assert!(matches!(result, Ok(()) | Err(SessionError::Busy(_))));
    }

    timeout(WAIT, async {
        loop {
            let states = (alice.session.state().await, bob.session.state().await);
            let roles = (alice.session.role().await, bob.session.role().await);
            let settled = match states {
                (ConnectionState::Listening, ConnectionState::Listening) => true,
                (ConnectionState::Pending, ConnectionState::Pending) => {
                    roles.0.is_some() && roles.1.is_some() && roles.0 != roles.1
                }
                _ => false,
            };
            if settled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sessions never settled");
}

// =========================================================================
// Messages
// =========================================================================

#[tokio::test]
async fn test_send_message_reaches_peer_with_receipt() {
    let net = MemoryNetwork::new();
    let (mut alice, mut bob) = connected_pair(&net).await;

    let uid = alice.session.send_message("hello bob").await.unwrap();

    let MessageEvent::Received(received) = bob.next_message().await else {
        panic!("expected Received");
    };
    assert_eq!(received.uid, uid);
    assert_eq!(received.text, "hello bob");
    assert!(!received.own);
    assert_eq!(received.peer_address, alice.address);

    let MessageEvent::Sent(sent) = alice.next_message().await else {
        panic!("expected Sent");
    };
    assert_eq!(sent.uid, uid);
    assert!(sent.own);
    assert!(sent.seen_here);
    assert_eq!(alice.next_message().await, MessageEvent::Delivered(uid));
}

#[tokio::test]
async fn test_message_uids_increase() {
    let net = MemoryNetwork::new();
    let (alice, _bob) = connected_pair(&net).await;

    let first = alice.session.send_message("one").await.unwrap();
    let second = alice.session.send_message("two").await.unwrap();

    assert!(second > first);
}

#[tokio::test]
async fn test_mark_seen_reaches_sender() {
    let net = MemoryNetwork::new();
    let (mut alice, mut bob) = connected_pair(&net).await;
    let uid = alice.session.send_message("look").await.unwrap();
    bob.next_message().await;

    bob.session.mark_seen(uid).await.unwrap();

    alice
        .wait_for(|e| *e == SessionEvent::Message(MessageEvent::Seen(uid)))
        .await;
}

#[tokio::test]
async fn test_send_message_before_connected_is_invalid_state() {
    let net = MemoryNetwork::new();
    let alice = peer(&net, "AA:01", "Alice");
    alice.session.start().await;

    let result = alice.session.send_message("anyone?").await;

    assert!(matches!(
        result,
        Err(SessionError::InvalidState {
            state: ConnectionState::Listening,
            ..
        })
    ));
}

#[tokio::test]
async fn test_negative_delivery_receipt_reports_not_delivered() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut raw = raw_connected(&net, &mut alice, 64 * 1024).await;

    raw.send(&Frame::new(FrameType::Delivered, Uid(3), false, "")).await;

    alice
        .wait_for(|e| {
            *e == SessionEvent::Message(MessageEvent::NotDelivered(Uid(3)))
        })
        .await;
}

#[tokio::test]
async fn test_unsubscribe_stops_events() {
    let net = MemoryNetwork::new();
    let (alice, mut bob) = connected_pair(&net).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    let id = bob.session.subscribe_messages(tx);

    assert!(bob.session.unsubscribe(id));
    alice.session.send_message("quiet").await.unwrap();
    bob.next_message().await;

    assert!(rx.try_recv().is_err());
    assert!(!bob.session.unsubscribe(id));
}

// =========================================================================
// Files
// =========================================================================

#[tokio::test]
async fn test_send_file_between_sessions() {
    let net = MemoryNetwork::new();
    let (mut alice, mut bob) = connected_pair(&net).await;
    let source = TempDir::new().unwrap();
    let (path, data) = write_file(source.path(), "photo.jpg", 5000);

    let file = alice
        .session
        .send_file(&path, PayloadKind::Image)
        .await
        .unwrap();
    assert_eq!(file.name, "photo.jpg");
    assert_eq!(file.size, 5000);
    assert_eq!(file.direction, TransferDirection::Outbound);

    // Sender: started, increasing progress ending at the size, finished.
    let FileEvent::SendingStarted(started) = alice.next_file().await else {
        panic!("expected SendingStarted");
    };
    assert_eq!(started.size, 5000);
    let mut last = 0;
    loop {
        match alice.next_file().await {
            FileEvent::SendingProgress { sent, size, .. } => {
                assert!(sent > last);
                assert_eq!(size, 5000);
                last = sent;
            }
            FileEvent::SendingFinished(done) => {
                assert_eq!(done.uid, file.uid);
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(last, 5000);
    let MessageEvent::Sent(sent) = alice.next_message().await else {
        panic!("expected Sent");
    };
    assert_eq!(sent.kind, PayloadKind::Image);
    assert_eq!(sent.file_path, Some(path.clone()));

    // Receiver: the file lands in its directory under the sender's name.
    let received = loop {
        if let FileEvent::ReceivingFinished(done) = bob.next_file().await {
            break done;
        }
    };
    assert_eq!(received.local_path, bob.dir.path().join("photo.jpg"));
    assert_eq!(std::fs::read(&received.local_path).unwrap(), data);
    let MessageEvent::Received(item) = bob.next_message().await else {
        panic!("expected Received");
    };
    assert_eq!(item.kind, PayloadKind::Image);
    assert_eq!(item.file_path, Some(received.local_path.clone()));
    assert_eq!(item.file_size, Some(5000));
    assert_eq!(bob.session.transferring_file().await, None);
}

#[tokio::test]
async fn test_cancel_outbound_file_sends_cancel_and_refuses_second_send() {
    let net = MemoryNetwork::new();
    let mut alice =
        peer_with(&net, "AA:01", "Alice", Collaborators::default(), 256);
    // A small pipe that nobody reads yet stalls the sender mid-file.
    let mut raw = raw_connected(&net, &mut alice, 1024).await;
    let source = TempDir::new().unwrap();
    let (path, _) = write_file(source.path(), "big.bin", 64 * 1024);
    let (other, _) = write_file(source.path(), "other.bin", 10);

    let file = alice.session.send_file(&path, PayloadKind::File).await.unwrap();
    assert_eq!(
        alice.session.transferring_file().await.map(|f| f.uid),
        Some(file.uid)
    );
    let second = alice.session.send_file(&other, PayloadKind::File).await;
    assert!(matches!(second, Err(SessionError::TransferInProgress)));

    let canceled = alice.session.cancel_file_transfer().await.unwrap();
    assert_eq!(canceled.uid, file.uid);

    let start = raw.frame_of(FrameType::FileStart).await;
    assert_eq!(start.uid, file.uid);
    let mut received = 0usize;
    let cancel = loop {
        match raw.next().await {
            Some(Wire::Chunk(data)) => received += data.len(),
            Some(Wire::Frame(frame)) if frame.kind == FrameType::FileCancel => {
                break frame;
            }
            Some(Wire::Frame(frame)) => {
                assert_ne!(frame.kind, FrameType::FileEnd);
            }
            None => panic!("channel closed before FileCancel"),
        }
    };
    assert_eq!(cancel.uid, file.uid);
    assert!(received < 64 * 1024);

    alice
        .wait_for(|e| {
            matches!(
                e,
                SessionEvent::File(FileEvent::Canceled {
                    by_partner: false,
                    ..
                })
            )
        })
        .await;
    assert_eq!(alice.session.transferring_file().await, None);
    assert_eq!(alice.session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_peer_cancel_discards_partial_inbound_file() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut raw = raw_connected(&net, &mut alice, 64 * 1024).await;

    raw.send(&Frame::new(FrameType::FileStart, Uid(1), false, "a.bin#100#FILE"))
        .await;
    raw.send_chunk(&[7u8; 10]).await;
    raw.send(&Frame::new(FrameType::FileCancel, Uid(1), false, "")).await;

    let FileEvent::ReceivingStarted(started) = alice.next_file().await else {
        panic!("expected ReceivingStarted");
    };
    assert_eq!(started.size, 100);
    assert_eq!(started.direction, TransferDirection::Inbound);
    let canceled = loop {
        match alice.next_file().await {
            FileEvent::ReceivingProgress { .. } => {}
            other => break other,
        }
    };
    assert!(matches!(
        canceled,
        FileEvent::Canceled {
            by_partner: true,
            ..
        }
    ));
    assert!(files_in(alice.dir.path()).is_empty());
    assert_eq!(alice.session.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_local_cancel_of_inbound_file_tells_sender() {
    let net = MemoryNetwork::new();
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut raw = raw_connected(&net, &mut alice, 64 * 1024).await;

    raw.send(&Frame::new(FrameType::FileStart, Uid(5), false, "b.bin#100#FILE"))
        .await;
    raw.send_chunk(&[1u8; 10]).await;
    alice
        .wait_for(|e| {
            matches!(e, SessionEvent::File(FileEvent::ReceivingProgress { .. }))
        })
        .await;

    let canceled = alice.session.cancel_file_transfer().await.unwrap();
    assert_eq!(canceled.uid, Uid(5));

    let cancel = raw.frame_of(FrameType::FileCancel).await;
    assert_eq!(cancel.uid, Uid(5));
    assert!(matches!(
        alice.next_file().await,
        FileEvent::Canceled {
            by_partner: false,
            ..
        }
    ));
    // Chunks still in flight are discarded without tearing anything down.
    raw.send_chunk(&[1u8; 10]).await;
    raw.send(&Frame::new(FrameType::Message, Uid(6), false, "still here"))
        .await;
    let MessageEvent::Received(item) = alice.next_message().await else {
        panic!("expected Received");
    };
    assert_eq!(item.text, "still here");
    assert!(files_in(alice.dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_without_transfer_is_refused() {
    let net = MemoryNetwork::new();
    let (alice, _bob) = connected_pair(&net).await;

    let result = alice.session.cancel_file_transfer().await;

    assert!(matches!(result, Err(SessionError::NoActiveTransfer)));
}

#[tokio::test]
async fn test_send_missing_file_is_file_error() {
    let net = MemoryNetwork::new();
    let (alice, _bob) = connected_pair(&net).await;

    let result = alice
        .session
        .send_file("/definitely/not/here.jpg", PayloadKind::Image)
        .await;

    assert!(matches!(result, Err(SessionError::File(_))));
}

// =========================================================================
// Collaborators
// =========================================================================

#[derive(Default)]
struct Journal {
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    shown: Vec<NotificationKey>,
    dismissed: Vec<NotificationKey>,
}

#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Journal>>);

impl MessageStore for Recording {
    fn insert_message(&self, message: &ChatMessage) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    fn insert_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().conversations.push(conversation.clone());
        Ok(())
    }
}

impl NotificationSink for Recording {
    fn show(&self, key: NotificationKey, _notification: Notification) {
        self.0.lock().unwrap().shown.push(key);
    }

    fn dismiss(&self, key: &NotificationKey) {
        self.0.lock().unwrap().dismissed.push(key.clone());
    }
}

#[tokio::test]
async fn test_collaborators_see_request_answer_and_message() {
    let net = MemoryNetwork::new();
    let journal = Recording::default();
    let collaborators = Collaborators::default()
        .with_store(journal.clone())
        .with_notifications(journal.clone());
    let mut alice = peer(&net, "AA:01", "Alice");
    let mut bob = peer_with(&net, "BB:02", "Bob", collaborators, 1024);
    alice.session.start().await;
    bob.session.start().await;
    wait_listening(&net, &bob.address).await;

    alice.session.connect(bob.address.clone()).await.unwrap();
    bob.wait_for(is_connected_incoming).await;
    {
        let journal = journal.0.lock().unwrap();
        assert_eq!(journal.conversations.len(), 1);
        assert_eq!(journal.conversations[0].display_name, "Alice");
        assert!(journal.shown.contains(&NotificationKey::Service));
        assert!(journal.shown.contains(&NotificationKey::ConnectionRequest));
    }

    bob.session.accept_connection().await.unwrap();
    alice.wait_for(is_connected_outgoing).await;
    let uid = alice.session.send_message("hi").await.unwrap();
    bob.next_message().await;

    let journal = journal.0.lock().unwrap();
    assert!(journal.dismissed.contains(&NotificationKey::ConnectionRequest));
    assert_eq!(journal.messages.len(), 1);
    assert_eq!(journal.messages[0].uid, uid);
    assert_eq!(journal.messages[0].text, "hi");
    assert!(journal
        .shown
        .contains(&NotificationKey::Message(alice.address.clone())));
}
