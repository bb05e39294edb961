//! The transfer contract: a stateful frame builder bound to one session.
//!
//! Everything that goes out on a channel is built here, so there is one
//! place that knows which frames carry a fresh uid and which refer back to
//! an existing one:
//!
//! | builder              | uid                     | flag            |
//! |----------------------|-------------------------|-----------------|
//! | `connect_request`    | `Uid::NONE`             | `true`          |
//! | `disconnect_request` | `Uid::NONE`             | `false`         |
//! | `connect_response`   | `Uid::NONE`             | accepted?       |
//! | `message`            | fresh                   | `false`         |
//! | `file_start`         | fresh                   | `false`         |
//! | `file_end`           | the file's uid          | `false`         |
//! | `file_cancel`        | the file's uid          | `false`         |
//! | `delivery`           | the received item's uid | delivered?      |
//! | `seen`               | the received item's uid | `true`          |

use serde::{Deserialize, Serialize};

use crate::{FileStartBody, Frame, FrameType, HandshakeBody, PayloadKind, Uid};

/// Protocol version this build speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// First uid handed out after a reset.
const FIRST_UID: u64 = 1;

/// How the local user presents themselves in a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProfile {
    pub display_name: String,
    /// Avatar color as a signed ARGB integer.
    pub color: i32,
}

impl LocalProfile {
    pub fn new(display_name: impl Into<String>, color: i32) -> Self {
        Self {
            display_name: display_name.into(),
            color,
        }
    }

    fn handshake(&self) -> HandshakeBody {
        HandshakeBody {
            display_name: self.display_name.clone(),
            color: self.color,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Builds outgoing frames and tracks per-session sequence state.
///
/// One instance lives for the whole life of a session object. It is reset
/// on every teardown, so uids only need to be unique within one connected
/// session.
#[derive(Debug)]
pub struct TransferProtocol {
    next_uid: u64,
    peer_version: Option<u32>,
}

impl Default for TransferProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferProtocol {
    pub fn new() -> Self {
        Self {
            next_uid: FIRST_UID,
            peer_version: None,
        }
    }

    /// Restores the initial uid and forgets the negotiated version.
    pub fn reset(&mut self) {
        self.next_uid = FIRST_UID;
        self.peer_version = None;
    }

    /// Records the version the peer announced in its handshake.
    pub fn setup_with(&mut self, peer_version: u32) {
        self.peer_version = Some(peer_version);
    }

    /// The peer's protocol version, once a handshake has been seen.
    pub fn peer_version(&self) -> Option<u32> {
        self.peer_version
    }

    /// Hands out the next uid of this session.
    pub fn next_uid(&mut self) -> Uid {
        let uid = Uid(self.next_uid);
        self.next_uid += 1;
        uid
    }

    pub fn connect_request(&self, profile: &LocalProfile) -> Frame {
        Frame::new(
            FrameType::ConnectRequest,
            Uid::NONE,
            true,
            profile.handshake().encode(),
        )
    }

    /// The notice sent right before a local disconnect closes the channel.
    pub fn disconnect_request(&self) -> Frame {
        Frame::control(FrameType::ConnectRequest, false)
    }

    pub fn connect_response(&self, profile: &LocalProfile, accept: bool) -> Frame {
        Frame::new(
            FrameType::ConnectResponse,
            Uid::NONE,
            accept,
            profile.handshake().encode(),
        )
    }

    pub fn message(&mut self, text: impl Into<String>) -> Frame {
        let uid = self.next_uid();
        Frame::new(FrameType::Message, uid, false, text)
    }

    pub fn file_start(
        &mut self,
        file_name: impl Into<String>,
        file_size: u64,
        kind: PayloadKind,
    ) -> Frame {
        let uid = self.next_uid();
        let body = FileStartBody {
            file_name: file_name.into(),
            file_size,
            kind,
        };
        Frame::new(FrameType::FileStart, uid, false, body.encode())
    }

    pub fn file_end(&self, uid: Uid) -> Frame {
        Frame::new(FrameType::FileEnd, uid, false, "")
    }

    pub fn file_cancel(&self, uid: Uid) -> Frame {
        Frame::new(FrameType::FileCancel, uid, false, "")
    }

    pub fn delivery(&self, uid: Uid, delivered: bool) -> Frame {
        Frame::new(FrameType::Delivered, uid, delivered, "")
    }

    pub fn seen(&self, uid: Uid) -> Frame {
        Frame::new(FrameType::Seen, uid, true, "")
    }
}
