//! Error types for the session layer.
//!
//! Only rejected commands are reported as errors. Failures of the channel
//! or of the peer never surface here; they become connection events.

use linkchat_protocol::FrameType;
use linkchat_transfer::TransferError;

use crate::ConnectionState;

/// Errors returned by [`Session`](crate::Session) commands.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session has not been started, or was stopped.
    #[error("session is not running")]
    NotRunning,

    /// `connect()` while a channel is adopted. Nothing was changed.
    #[error("session is busy ({0})")]
    Busy(ConnectionState),

    /// The command makes no sense in the current state, e.g. sending a
    /// message before the handshake completed.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// `send_control()` with a frame the session builds itself.
    #[error("{0:?} is not a control frame")]
    NotAControlFrame(FrameType),

    /// A file is already being sent or received.
    #[error("a file transfer is already in progress")]
    TransferInProgress,

    /// `cancel_file_transfer()` with no file in flight.
    #[error("no file transfer in progress")]
    NoActiveTransfer,

    /// The local file to send could not be inspected.
    #[error("cannot send file: {0}")]
    File(#[from] std::io::Error),

    /// The engine refused the command (usually because its channel just
    /// closed).
    #[error(transparent)]
    Transfer(TransferError),
}

impl From<TransferError> for SessionError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::TransferInProgress => Self::TransferInProgress,
            TransferError::NoActiveTransfer => Self::NoActiveTransfer,
            other => Self::Transfer(other),
        }
    }
}
