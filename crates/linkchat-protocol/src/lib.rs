//! Wire protocol for linkchat.
//!
//! This crate defines the language both ends of a channel speak:
//!
//! - **Types** ([`Frame`], [`FrameType`], [`Uid`], [`PayloadKind`]) and
//!   the typed composite bodies ([`HandshakeBody`], [`FileStartBody`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`FrameCodec`]): how
//!   frames become delimited records, plus the raw chunk header layout.
//! - **Contract** ([`TransferProtocol`]): the per-session builder that
//!   assigns uids and shapes every outgoing frame.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the raw channel and the transfer
//! engine. It knows nothing about sockets, files or session state.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Transfer engine → Session
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod contract;
mod error;
mod fields;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codec::{
    CHUNK_HEADER_LEN, CHUNK_TAG, Codec, FrameCodec, RECORD_DELIMITER,
    chunk_header, chunk_len,
};
pub use contract::{LocalProfile, PROTOCOL_VERSION, TransferProtocol};
pub use error::ProtocolError;
pub use fields::{FIELD_SEPARATOR, join_fields, split_fields};
pub use types::{FileStartBody, Frame, FrameType, HandshakeBody, PayloadKind, Uid};
