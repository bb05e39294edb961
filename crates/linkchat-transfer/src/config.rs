//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of file bytes written per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Largest chunk either side will write or accept.
pub const MAX_CHUNK_LEN: usize = 64 * 1024;

/// Default upper bound for one encoded frame record.
pub const DEFAULT_MAX_RECORD_LEN: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for one transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File bytes per outgoing chunk. Clamped to `1..=MAX_CHUNK_LEN`.
    pub chunk_size: usize,

    /// Directory received files are written to.
    pub files_directory: PathBuf,

    /// Longest frame record accepted from the peer. Longer records are a
    /// protocol violation.
    pub max_record_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            files_directory: std::env::temp_dir().join("linkchat"),
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

impl EngineConfig {
    /// The chunk size actually used on the wire.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_LEN)
    }
}
