//! Codec trait, the JSON implementation, and record framing.
//!
//! There are two layers here:
//!
//! 1. A [`Codec`] turns a serde value into bytes and back. It does not know
//!    about frames or delimiters. [`JsonCodec`] is the one we ship.
//! 2. [`FrameCodec`] wraps a codec and turns a [`Frame`] into one wire
//!    *record*: the encoded bytes followed by [`RECORD_DELIMITER`].
//!
//! ```text
//! {"type":0,"uid":3,"flag":false,"body":"hi"}\n      ← frame record
//! 0x00 | 00 00 20 00 | <8192 bytes of file>          ← file chunk
//! ```
//!
//! A record always starts with `{`, a chunk always starts with
//! [`CHUNK_TAG`]. The reader peeks one byte to know which one follows.

use serde::{Serialize, de::DeserializeOwned};

use crate::types::WireFrame;
use crate::{Frame, ProtocolError};

/// Terminates every frame record on the wire.
pub const RECORD_DELIMITER: u8 = b'\n';

/// First byte of every raw file chunk.
pub const CHUNK_TAG: u8 = 0x00;

/// Size of the chunk header: tag plus a big-endian `u32` length.
pub const CHUNK_HEADER_LEN: usize = 5;

/// Builds the header that precedes `len` bytes of file content.
pub fn chunk_header(len: u32) -> [u8; CHUNK_HEADER_LEN] {
    let [a, b, c, d] = len.to_be_bytes();
    [CHUNK_TAG, a, b, c, d]
}

/// Reads the content length out of the four bytes after [`CHUNK_TAG`].
pub fn chunk_len(header: [u8; 4]) -> u32 {
    u32::from_be_bytes(header)
}

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by the
/// reader and writer tasks of an engine.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// `serde_json` escapes every control character inside strings, so a
/// message body containing `\n` is written as the two characters `\` `n`
/// and never as the raw record delimiter.
///
/// This is behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Converts [`Frame`]s to delimited wire records and back.
///
/// ## Example
///
/// ```rust
/// use linkchat_protocol::{Frame, FrameCodec, FrameType, JsonCodec, Uid};
///
/// let codec = FrameCodec::new(JsonCodec);
/// let frame = Frame::new(FrameType::Message, Uid(1), false, "line one\nline two");
///
/// let record = codec.encode(&frame).unwrap();
/// assert_eq!(record.last(), Some(&b'\n'));
/// assert_eq!(record.iter().filter(|b| **b == b'\n').count(), 1);
///
/// assert_eq!(codec.decode(&record).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameCodec<C> {
    codec: C,
}

impl<C: Codec> FrameCodec<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Encodes `frame` as one record, delimiter included.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the codec produced
    /// bytes that would be ambiguous on the wire (an embedded delimiter or
    /// a leading chunk tag).
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let mut record = self.codec.encode(&WireFrame::from(frame))?;
        if record.first() == Some(&CHUNK_TAG) {
            return Err(ProtocolError::InvalidMessage(
                "encoded record starts with the chunk tag".into(),
            ));
        }
        if record.contains(&RECORD_DELIMITER) {
            return Err(ProtocolError::InvalidMessage(
                "encoded record contains the record delimiter".into(),
            ));
        }
        record.push(RECORD_DELIMITER);
        Ok(record)
    }

    /// Decodes one record. A trailing delimiter (and `\r` before it) is
    /// ignored.
    ///
    /// # Errors
    /// Returns a decode error for malformed records and
    /// [`ProtocolError::UnknownFrameType`] for records with a type code
    /// this version does not know.
    pub fn decode(&self, record: &[u8]) -> Result<Frame, ProtocolError> {
        let record = record.strip_suffix(&[RECORD_DELIMITER]).unwrap_or(record);
        let record = record.strip_suffix(b"\r").unwrap_or(record);
        let wire: WireFrame = self.codec.decode(record)?;
        Frame::try_from(wire)
    }
}
