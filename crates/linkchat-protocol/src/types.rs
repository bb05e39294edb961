//! Core protocol types for the linkchat wire format.
//!
//! Every unit exchanged over a channel is a [`Frame`]. Frames are small and
//! flat on purpose: a type tag, a correlation id, one boolean, and a string
//! body. Composite bodies (handshake, file start) get their own typed
//! records here so callers never split strings by hand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fields::{join_fields, split_fields};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Uid
// ---------------------------------------------------------------------------

/// Session-scoped identifier of a payload or file item.
///
/// A `Uid` correlates a `Message`/`FileStart` frame with the delivery,
/// seen, end and cancel frames that refer to it later. Uids are only unique
/// within one connected session; they restart after every reset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Uid(pub u64);

impl Uid {
    /// Carried by control frames that do not refer to an item.
    pub const NONE: Uid = Uid(0);
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FrameType
// ---------------------------------------------------------------------------

/// The tag that says what a [`Frame`] means.
///
/// On the wire each type is a small integer code. Code 5 is unused and
/// rejected like any other unknown code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// A text message. `uid` identifies it, `body` is the text.
    Message,
    /// Delivery receipt for `uid`. `flag == false` means not delivered.
    Delivered,
    /// Seen receipt for `uid`.
    Seen,
    /// Handshake opener (`flag == true`) or disconnect notice
    /// (`flag == false`).
    ConnectRequest,
    /// Handshake answer: accepted (`flag == true`) or rejected.
    ConnectResponse,
    /// Announces a file; raw chunks follow.
    FileStart,
    /// Closes the file announced by `FileStart` with the same `uid`.
    FileEnd,
    /// Aborts the file transfer with the same `uid`.
    FileCancel,
}

impl FrameType {
    /// Every frame type, in code order.
    pub const ALL: [FrameType; 8] = [
        Self::Message,
        Self::Delivered,
        Self::ConnectResponse,
        Self::ConnectRequest,
        Self::Seen,
        Self::FileStart,
        Self::FileEnd,
        Self::FileCancel,
    ];

    /// The integer code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Message => 0,
            Self::Delivered => 1,
            Self::ConnectResponse => 2,
            Self::ConnectRequest => 3,
            Self::Seen => 4,
            Self::FileStart => 6,
            Self::FileEnd => 7,
            Self::FileCancel => 8,
        }
    }

    /// Returns `true` for frames that carry user payload (text or a file
    /// announcement) and therefore must not appear before the handshake.
    pub fn is_payload(self) -> bool {
        matches!(self, Self::Message | Self::FileStart)
    }
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or(ProtocolError::UnknownFrameType(code))
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// The atomic wire unit.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ kind: Message                │  ← what this frame means
/// │ uid:  U-3                    │  ← which item it is about
/// │ flag: true                   │  ← accept/deliver/seen, per kind
/// │ body: "see you at 5"         │  ← text, or composite sub-fields
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameType,
    pub uid: Uid,
    pub flag: bool,
    pub body: String,
}

impl Frame {
    pub fn new(
        kind: FrameType,
        uid: Uid,
        flag: bool,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            uid,
            flag,
            body: body.into(),
        }
    }

    /// A control frame with no item and an empty body.
    pub fn control(kind: FrameType, flag: bool) -> Self {
        Self::new(kind, Uid::NONE, flag, "")
    }

    /// Parses the body of a `ConnectRequest`/`ConnectResponse`.
    pub fn handshake(&self) -> Result<HandshakeBody, ProtocolError> {
        HandshakeBody::decode(self.kind, &self.body)
    }

    /// Parses the body of a `FileStart`.
    pub fn file_start(&self) -> Result<FileStartBody, ProtocolError> {
        FileStartBody::decode(&self.body)
    }
}

/// The shape of a frame on the wire, before the type code is checked.
///
/// Decoding goes through this struct so that an unknown code becomes the
/// typed [`ProtocolError::UnknownFrameType`] instead of a generic codec
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireFrame {
    #[serde(rename = "type")]
    pub(crate) code: u8,
    pub(crate) uid: u64,
    pub(crate) flag: bool,
    #[serde(default)]
    pub(crate) body: String,
}

impl From<&Frame> for WireFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            code: frame.kind.code(),
            uid: frame.uid.0,
            flag: frame.flag,
            body: frame.body.clone(),
        }
    }
}

impl TryFrom<WireFrame> for Frame {
    type Error = ProtocolError;

    fn try_from(wire: WireFrame) -> Result<Self, Self::Error> {
        Ok(Frame {
            kind: FrameType::try_from(wire.code)?,
            uid: Uid(wire.uid),
            flag: wire.flag,
            body: wire.body,
        })
    }
}

// ---------------------------------------------------------------------------
// PayloadKind
// ---------------------------------------------------------------------------

/// What a chat item carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    #[default]
    Text,
    Image,
    File,
}

impl PayloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "IMAGE" => Ok(Self::Image),
            "FILE" => Ok(Self::File),
            other => Err(ProtocolError::InvalidBody {
                kind: FrameType::FileStart,
                reason: format!("unknown payload kind {other:?}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Composite bodies
// ---------------------------------------------------------------------------

/// Body of a handshake frame: who the sender says they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeBody {
    pub display_name: String,
    /// Avatar color as a signed ARGB integer.
    pub color: i32,
    /// Protocol version of the sender. Peers that predate versioning omit
    /// the field; it then decodes as 0.
    pub protocol_version: u32,
}

impl HandshakeBody {
    pub fn encode(&self) -> String {
        join_fields([
            self.display_name.clone(),
            self.color.to_string(),
            self.protocol_version.to_string(),
        ])
    }

    pub fn decode(kind: FrameType, body: &str) -> Result<Self, ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidBody {
            kind,
            reason,
        };

        let fields = split_fields(body)?;
        if !(2..=3).contains(&fields.len()) {
            return Err(invalid(format!(
                "expected 2 or 3 fields, got {}",
                fields.len()
            )));
        }

        let color = fields[1]
            .trim()
            .parse::<i32>()
            .map_err(|e| invalid(format!("bad color {:?}: {e}", fields[1])))?;
        let protocol_version = match fields.get(2) {
            Some(v) => v.trim().parse::<u32>().map_err(|e| {
                invalid(format!("bad protocol version {v:?}: {e}"))
            })?,
            None => 0,
        };

        Ok(Self {
            display_name: fields[0].clone(),
            color,
            protocol_version,
        })
    }
}

/// Body of a `FileStart` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStartBody {
    pub file_name: String,
    pub file_size: u64,
    pub kind: PayloadKind,
}

impl FileStartBody {
    pub fn encode(&self) -> String {
        join_fields([
            self.file_name.clone(),
            self.file_size.to_string(),
            self.kind.as_str().to_string(),
        ])
    }

    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidBody {
            kind: FrameType::FileStart,
            reason,
        };

        let fields = split_fields(body)?;
        let [file_name, size, kind] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected 3 fields, got {}",
                fields.len()
            )));
        };
        if file_name.is_empty() {
            return Err(invalid("empty file name".into()));
        }

        Ok(Self {
            file_name: file_name.clone(),
            file_size: size
                .parse()
                .map_err(|e| invalid(format!("bad file size {size:?}: {e}")))?,
            kind: kind.parse()?,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
