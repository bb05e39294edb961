//! Unified error type for linkchat.

use linkchat_protocol::ProtocolError;
use linkchat_session::SessionError;
use linkchat_transfer::TransferError;
use linkchat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Applications built on the `linkchat` facade handle this single type;
/// `?` converts errors from every layer through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum LinkChatError {
    /// A transport-level error (listen, accept, dial).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid body).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A transfer engine error (chunk, file, closed engine).
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A session command was refused.
    #[error(transparent)]
    Session(#[from] SessionError),
}
