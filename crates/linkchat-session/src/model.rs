//! Records the session hands to the message store.

use std::path::PathBuf;
use std::time::SystemTime;

use linkchat_protocol::{HandshakeBody, PayloadKind, Uid};
use linkchat_transfer::TransferringFile;
use linkchat_transport::{PeerAddress, PeerInfo};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// The peer of a completed handshake.
///
/// Built from what the transport reported about the channel plus what the
/// peer announced about itself. Lives as long as the channel does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub peer_address: PeerAddress,
    /// Device name reported by the transport, `"?"` if unknown.
    pub device_name: String,
    /// Name the peer announced in its handshake.
    pub display_name: String,
    pub color: i32,
    pub protocol_version: u32,
}

impl Conversation {
    pub fn from_handshake(peer: &PeerInfo, handshake: HandshakeBody) -> Self {
        Self {
            peer_address: peer.address.clone(),
            device_name: peer.device_name().to_string(),
            display_name: handshake.display_name,
            color: handshake.color,
            protocol_version: handshake.protocol_version,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A settled chat item: a text message, or a file that finished
/// transferring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub uid: Uid,
    pub peer_address: PeerAddress,
    pub date: SystemTime,
    /// `true` if the local user sent it.
    pub own: bool,
    /// Message text. Empty for files.
    pub text: String,
    /// The local user has already seen it (it was sent by us, or arrived
    /// while the peer's chat was in the foreground).
    pub seen_here: bool,
    pub delivered: bool,
    pub kind: PayloadKind,
    /// Where the file lives locally. `None` for text.
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
}

impl ChatMessage {
    pub fn text(
        uid: Uid,
        peer_address: PeerAddress,
        own: bool,
        text: impl Into<String>,
    ) -> Self {
        Self {
            uid,
            peer_address,
            date: SystemTime::now(),
            own,
            text: text.into(),
            seen_here: own,
            delivered: false,
            kind: PayloadKind::Text,
            file_path: None,
            file_size: None,
        }
    }

    /// The chat item for a file that finished transferring.
    pub fn file(
        peer_address: PeerAddress,
        own: bool,
        file: &TransferringFile,
    ) -> Self {
        Self {
            uid: file.uid,
            peer_address,
            date: SystemTime::now(),
            own,
            text: String::new(),
            seen_here: own,
            delivered: false,
            kind: file.kind,
            file_path: Some(file.local_path.clone()),
            file_size: Some(file.size),
        }
    }

    /// A short line describing the item, for notifications.
    pub fn preview(&self) -> String {
        match self.kind {
            PayloadKind::Text => self.text.clone(),
            PayloadKind::Image | PayloadKind::File => self
                .file_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.kind.to_string()),
        }
    }
}
