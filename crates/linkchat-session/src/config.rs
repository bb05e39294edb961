//! Session configuration.

use std::path::PathBuf;

use linkchat_protocol::LocalProfile;
use linkchat_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_LEN, EngineConfig};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for one [`Session`](crate::Session).
///
/// The display name and color are announced to the peer in every
/// handshake. The rest is handed to the transfer engine of each adopted
/// channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name shown to the peer.
    pub display_name: String,

    /// Color tag shown to the peer, as a packed RGB integer.
    pub color: i32,

    /// Directory received files are written to.
    pub files_directory: PathBuf,

    /// File bytes per outgoing chunk.
    pub chunk_size: usize,

    /// Longest frame record accepted from the peer.
    pub max_record_len: usize,

    /// Answer every received message with `Delivered{flag=true}`.
    ///
    /// Default: on.
    pub auto_delivery_receipts: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: String::from("linkchat"),
            color: 0,
            files_directory: std::env::temp_dir().join("linkchat"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            auto_delivery_receipts: true,
        }
    }
}

impl SessionConfig {
    /// What the handshake announces about us.
    pub fn profile(&self) -> LocalProfile {
        LocalProfile::new(self.display_name.clone(), self.color)
    }

    /// The engine settings derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_size: self.chunk_size,
            files_directory: self.files_directory.clone(),
            max_record_len: self.max_record_len,
        }
    }
}
