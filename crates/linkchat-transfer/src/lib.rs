//! Data transfer engine for linkchat.
//!
//! A [`TransferEngine`] takes ownership of one established channel and runs
//! two Tokio tasks on it:
//!
//! - a **reader** that decodes frame records and raw file chunks in order,
//!   handles the file-control frames itself and forwards everything else;
//! - a **writer** that serializes every write, streaming files in bounded
//!   chunks and slotting queued text frames in between chunks.
//!
//! Progress and outcomes come back as [`EngineEvent`]s on an unbounded
//! queue. The engine never retries: any read or write failure ends in one
//! [`EngineEvent::Closed`] and the owner decides what happens next.
//!
//! # Key types
//!
//! - [`TransferEngine`]: handle to the two tasks
//! - [`EngineConfig`]: chunk size, receive directory, record limit
//! - [`FileEvent`] / [`TransferringFile`]: file transfer progress
//! - [`TransferError`]: what can go wrong

mod config;
mod engine;
mod error;
mod event;
mod files;
mod reader;
mod writer;

pub use config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_LEN, EngineConfig, MAX_CHUNK_LEN,
};
pub use engine::{EngineEvents, TransferEngine};
pub use error::TransferError;
pub use event::{
    CloseReason, EngineEvent, FileEvent, TransferDirection, TransferringFile,
};
pub use files::sanitize_file_name;
