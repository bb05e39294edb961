//! What an engine reports back to its owner.

use std::path::PathBuf;

use linkchat_protocol::{Frame, PayloadKind, Uid};

use crate::TransferError;

/// Which way a file is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Outbound,
    Inbound,
}

/// Descriptor of a file transfer in flight.
///
/// For outbound files `local_path` is the source. For inbound files it is
/// the temporary file while receiving and the final destination in
/// [`FileEvent::ReceivingFinished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferringFile {
    pub uid: Uid,
    pub name: String,
    pub size: u64,
    pub kind: PayloadKind,
    pub direction: TransferDirection,
    pub local_path: PathBuf,
}

/// Progress and outcome of file transfers.
///
/// Every transfer that reports `*Started` ends with exactly one of
/// `*Finished`, `*Failed` or `Canceled`, unless the channel closes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// `FileStart` has been written; chunks follow.
    SendingStarted(TransferringFile),
    /// Cumulative bytes written so far.
    SendingProgress { uid: Uid, sent: u64, size: u64 },
    /// `FileEnd` has been written.
    SendingFinished(TransferringFile),
    /// The source could not be read. A `FileCancel` went out if the peer had
    /// already seen `FileStart`.
    SendingFailed { file: TransferringFile, reason: String },
    /// The peer announced a file and the temp file is open.
    ReceivingStarted(TransferringFile),
    /// Cumulative bytes received so far.
    ReceivingProgress { uid: Uid, received: u64, size: u64 },
    /// The file is complete and moved to its final path.
    ReceivingFinished(TransferringFile),
    /// Writing the received file failed. The channel stays up and the
    /// rest of this file's chunks are discarded.
    ReceivingFailed { file: TransferringFile, reason: String },
    /// The transfer was aborted; `by_partner` tells who asked.
    Canceled { file: TransferringFile, by_partner: bool },
}

impl FileEvent {
    /// The uid of the transfer this event is about.
    pub fn uid(&self) -> Uid {
        match self {
            Self::SendingStarted(f)
            | Self::SendingFinished(f)
            | Self::ReceivingStarted(f)
            | Self::ReceivingFinished(f)
            | Self::SendingFailed { file: f, .. }
            | Self::ReceivingFailed { file: f, .. }
            | Self::Canceled { file: f, .. } => f.uid,
            Self::SendingProgress { uid, .. }
            | Self::ReceivingProgress { uid, .. } => *uid,
        }
    }

    /// Returns `true` for events that end a transfer.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SendingFinished(_)
                | Self::SendingFailed { .. }
                | Self::ReceivingFinished(_)
                | Self::ReceivingFailed { .. }
                | Self::Canceled { .. }
        )
    }
}

/// Why an engine stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed the channel.
    EndOfStream,
    /// Reading, writing or decoding failed.
    Failed(TransferError),
}

/// Everything an engine emits, in the order its tasks produced it.
#[derive(Debug)]
pub enum EngineEvent {
    /// A decoded frame the engine does not consume itself (everything but
    /// the file-control frames).
    FrameReceived(Frame),
    /// A frame has been written to the channel.
    FrameSent(Frame),
    /// File transfer progress.
    File(FileEvent),
    /// The engine's channel is gone. Emitted once per failing task, so the
    /// owner must tolerate a second one.
    Closed(CloseReason),
}
