//! `LinkChatBuilder`: configures and creates a [`Session`].

use std::path::PathBuf;

use linkchat_session::{Collaborators, Session, SessionConfig};
use linkchat_transport::Transport;

/// Entry point of the facade.
///
/// # Example
///
/// ```rust,no_run
/// use linkchat::prelude::*;
///
/// # async fn run() {
/// let session = LinkChat::builder()
///     .display_name("Alice")
///     .files_directory("/tmp/linkchat-files")
///     .build(TcpTransport::new("0.0.0.0:7070"));
/// session.start().await;
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkChat;

impl LinkChat {
    /// Creates a new builder.
    pub fn builder() -> LinkChatBuilder {
        LinkChatBuilder::new()
    }
}

/// Builder for a linkchat [`Session`].
///
/// Starts from [`SessionConfig::default()`] and no-op collaborators.
#[derive(Debug, Clone, Default)]
pub struct LinkChatBuilder {
    config: SessionConfig,
    collaborators: Collaborators,
}

impl LinkChatBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name announced to the peer in the handshake.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = name.into();
        self
    }

    /// Sets the color tag announced to the peer.
    pub fn color(mut self, color: i32) -> Self {
        self.config.color = color;
        self
    }

    /// Sets the directory received files are stored in.
    pub fn files_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.files_directory = dir.into();
        self
    }

    /// Sets the number of file bytes per outgoing chunk.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    pub fn auto_delivery_receipts(mut self, enabled: bool) -> Self {
        self.config.auto_delivery_receipts = enabled;
        self
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the store, notification sink and the other host services.
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Creates a stopped session over `transport`.
    ///
    /// Must be called from within a Tokio runtime. Call
    /// [`Session::start()`] to begin listening.
    pub fn build<T: Transport>(self, transport: T) -> Session<T> {
        tracing::debug!(
            name = %self.config.display_name,
            files = %self.config.files_directory.display(),
            chunk_size = self.config.chunk_size,
            "building session"
        );
        Session::new(transport, self.config, self.collaborators)
    }
}
