//! Error types for the transfer layer.

use linkchat_protocol::ProtocolError;

/// Errors that can occur while an engine owns a channel.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Reading from or writing to the channel, or a local file, failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record from the peer could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A raw chunk arrived with no inbound transfer to put it in, or it
    /// overran the announced file size.
    #[error("out-of-sequence file chunk of {len} bytes")]
    OutOfSequenceChunk { len: usize },

    /// A chunk header announced more bytes than any sender may write.
    #[error("file chunk of {0} bytes exceeds the maximum")]
    ChunkTooLarge(usize),

    /// The peer announced a file before the handshake completed.
    #[error("file announced before the handshake")]
    FileBeforeHandshake,

    /// The peer announced a second inbound file while one is running.
    #[error("peer started file {0} while another inbound file is active")]
    OverlappingInboundFile(linkchat_protocol::Uid),

    /// A local `send_file` while a transfer is already active.
    #[error("a file transfer is already in progress")]
    TransferInProgress,

    /// A local cancel with nothing to cancel.
    #[error("no file transfer in progress")]
    NoActiveTransfer,

    /// The engine's tasks have stopped; the channel is gone.
    #[error("transfer engine is closed")]
    EngineClosed,
}

impl TransferError {
    /// Returns `true` for errors caused by the peer breaking the protocol,
    /// as opposed to the channel itself failing.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_)
                | Self::OutOfSequenceChunk { .. }
                | Self::ChunkTooLarge(_)
                | Self::FileBeforeHandshake
                | Self::OverlappingInboundFile(_)
        )
    }
}
