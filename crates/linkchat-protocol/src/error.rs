//! Error types for the protocol layer.
//!
//! Every way a byte sequence can fail to become a [`Frame`](crate::Frame)
//! ends up here. The session layer treats all of them as a protocol
//! violation and tears the channel down.

use crate::FrameType;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of a wire record failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The record is not valid for the codec (malformed, truncated,
    /// missing fields).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The record decoded, but its type code is not one we know.
    #[error("unknown frame type code {0}")]
    UnknownFrameType(u8),

    /// A handshake or file-start body does not have the expected fields.
    #[error("invalid {kind:?} body: {reason}")]
    InvalidBody { kind: FrameType, reason: String },

    /// A record exceeded the configured maximum length.
    #[error("record longer than {0} bytes")]
    RecordTooLong(usize),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
