//! What a session reports to its observers.
//!
//! Three families, each with its own observer trait:
//!
//! | family                | observer trait       |
//! |-----------------------|----------------------|
//! | [`ConnectionEvent`]   | `ConnectionObserver` |
//! | [`MessageEvent`]      | `MessageObserver`    |
//! | [`FileEvent`]         | `FileObserver`       |
//!
//! [`SessionEvent`] wraps all three for consumers that want one stream.

use linkchat_protocol::Uid;
pub use linkchat_transfer::FileEvent;
use linkchat_transport::{PeerAddress, PeerInfo};

use crate::{ChatMessage, Conversation};

/// Connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` started a dial.
    Connecting(PeerAddress),
    /// A channel was adopted; the handshake has not happened yet.
    Connected(PeerInfo),
    /// The peer asked to connect. Answer with `accept_connection()` or
    /// `reject_connection()`.
    ConnectedIncoming(Conversation),
    /// The peer accepted our request. Follows `Accepted`.
    ConnectedOutgoing(Conversation),
    /// The peer accepted our request.
    Accepted,
    /// The peer rejected our request.
    Rejected,
    /// The channel failed while pending or connected.
    Lost,
    /// The peer gave up on its own pending request before we answered.
    Withdrawn,
    /// The dial started by `connect()` failed.
    Failed,
    /// The peer disconnected politely.
    Disconnected,
    /// `stop()` tore the session down.
    Destroyed,
}

/// Text messages and receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A text message or finished inbound file, already stored.
    Received(ChatMessage),
    /// A text message or finished outbound file was written to the
    /// channel, and stored.
    Sent(ChatMessage),
    Delivered(Uid),
    NotDelivered(Uid),
    Seen(Uid),
}

/// Any event, tagged with its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connection(ConnectionEvent),
    Message(MessageEvent),
    File(FileEvent),
}

impl From<ConnectionEvent> for SessionEvent {
    fn from(event: ConnectionEvent) -> Self {
        Self::Connection(event)
    }
}

impl From<MessageEvent> for SessionEvent {
    fn from(event: MessageEvent) -> Self {
        Self::Message(event)
    }
}

impl From<FileEvent> for SessionEvent {
    fn from(event: FileEvent) -> Self {
        Self::File(event)
    }
}
