//! The engine handle: one adopted channel, a reader task and a writer task.
//!
//! ```text
//!                  ┌───────────── TransferEngine (handle) ─────────────┐
//!   send_frame ───→│ commands ──→ writer task ──→ channel write half   │
//!   send_file  ───→│                 ↑ try_recv between chunks          │
//!   cancel_file ──→│                 │                                  │
//!                  │   Shared { transfers, files_enabled, events }      │
//!                  │                 ↓                                  │
//!   events ←───────│ reader task ←── channel read half                  │
//!                  └────────────────────────────────────────────────────┘
//! ```
//!
//! The handle is owned by the session. Dropping it aborts both tasks, which
//! drops both channel halves and closes the channel. [`TransferEngine::close`]
//! is the polite variant: queued frames and an optional farewell frame are
//! flushed first.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkchat_protocol::{Frame, PayloadKind, TransferProtocol, Uid};
use linkchat_transport::{Channel, ChannelId, PeerInfo};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::reader::Reader;
use crate::writer::{OutboundFile, Writer, WriterCommand};
use crate::{
    EngineConfig, EngineEvent, FileEvent, TransferDirection, TransferError,
    TransferringFile,
};

/// Receiving end of an engine's events.
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Transfer bookkeeping shared by the handle and both tasks.
#[derive(Debug, Default)]
pub(crate) struct Transfers {
    pub(crate) outbound: Option<TransferringFile>,
    /// Set by the reader when the peer cancels the outbound file; the
    /// writer consumes it between chunks.
    pub(crate) outbound_canceled_by_peer: bool,
    pub(crate) inbound: Option<TransferringFile>,
    /// The inbound file the local user canceled. The reader discards the
    /// rest of its chunks.
    pub(crate) inbound_canceled: Option<Uid>,
}

pub(crate) struct Shared {
    transfers: Mutex<Transfers>,
    files_enabled: AtomicBool,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Shared {
    /// Locks the transfer table. Never held across an `.await`.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Transfers> {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn files_enabled(&self) -> bool {
        self.files_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn enable_files(&self) {
        self.files_enabled.store(true, Ordering::Release);
    }

    /// Sends an event to the owner. A dropped receiver means nobody cares
    /// anymore, so the error is ignored.
    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn emit_file(&self, event: FileEvent) {
        self.emit(EngineEvent::File(event));
    }
}

// ---------------------------------------------------------------------------
// TransferEngine
// ---------------------------------------------------------------------------

/// Handle to the reader and writer tasks of one channel.
pub struct TransferEngine {
    id: ChannelId,
    peer: PeerInfo,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<WriterCommand>,
    reader: AbortHandle,
    writer: AbortHandle,
    closing: bool,
}

impl TransferEngine {
    /// Takes ownership of `channel` and starts its reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C: Channel>(
        channel: C,
        config: &EngineConfig,
    ) -> (Self, EngineEvents) {
        let id = channel.id();
        let peer = channel.peer().clone();
        let (read_half, write_half) = channel.into_split();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            transfers: Mutex::new(Transfers::default()),
            files_enabled: AtomicBool::new(false),
            events: events_tx,
        });

        let reader = Reader::new(id, read_half, Arc::clone(&shared), config);
        let reader_task = tokio::spawn(reader.run());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let writer = Writer::new(
            id,
            write_half,
            commands_rx,
            Arc::clone(&shared),
            config.effective_chunk_size(),
            reader_task.abort_handle(),
        );
        let writer_task = tokio::spawn(writer.run());

        tracing::debug!(%id, peer = %peer.address, "transfer engine started");

        let engine = Self {
            id,
            peer,
            shared,
            commands: commands_tx,
            reader: reader_task.abort_handle(),
            writer: writer_task.abort_handle(),
            closing: false,
        };
        (engine, events_rx)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// What the transport reported about the remote end.
    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    /// Allows inbound `FileStart` frames. Before this is called (i.e.
    /// before the handshake completes) a `FileStart` is a protocol
    /// violation.
    ///
    /// The reader opens the gate by itself when it reads a positive
    /// `ConnectResponse`.
    pub fn enable_files(&self) {
        self.shared.enable_files();
    }

    /// Returns `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// The transfer in flight, outbound first.
    pub fn transferring_file(&self) -> Option<TransferringFile> {
        let transfers = self.shared.lock();
        transfers
            .outbound
            .clone()
            .or_else(|| transfers.inbound.clone())
    }

    /// Queues one frame. It is written whole, between file chunks if a file
    /// is streaming, and reported back as [`EngineEvent::FrameSent`].
    pub fn send_frame(&self, frame: Frame) -> Result<(), TransferError> {
        self.commands
            .send(WriterCommand::Frame(frame))
            .map_err(|_| TransferError::EngineClosed)
    }

    /// Queues a file for streaming and returns its descriptor.
    ///
    /// The uid is taken from `contract` only once the engine has accepted
    /// the file, so a refused send does not burn one.
    ///
    /// # Errors
    /// - [`TransferError::TransferInProgress`] if any file, in either
    ///   direction, is already in flight.
    /// - [`TransferError::EngineClosed`] if the writer is gone.
    pub fn send_file(
        &self,
        contract: &mut TransferProtocol,
        path: PathBuf,
        name: impl Into<String>,
        size: u64,
        kind: PayloadKind,
    ) -> Result<TransferringFile, TransferError> {
        let job = {
            let mut transfers = self.shared.lock();
            if transfers.outbound.is_some() || transfers.inbound.is_some() {
                return Err(TransferError::TransferInProgress);
            }

            let name = name.into();
            let start = contract.file_start(name.clone(), size, kind);
            let file = TransferringFile {
                uid: start.uid,
                name,
                size,
                kind,
                direction: TransferDirection::Outbound,
                local_path: path,
            };
            transfers.outbound = Some(file.clone());
            transfers.outbound_canceled_by_peer = false;

            OutboundFile {
                end: contract.file_end(file.uid),
                cancel: contract.file_cancel(file.uid),
                start,
                file,
            }
        };

        let file = job.file.clone();
        if self.commands.send(WriterCommand::File(job)).is_err() {
            self.shared.lock().outbound = None;
            return Err(TransferError::EngineClosed);
        }
        tracing::debug!(id = %self.id, uid = %file.uid, name = %file.name, size, "file queued");
        Ok(file)
    }

    /// Cancels the transfer in flight and tells the peer with `FileCancel`.
    ///
    /// An outbound file is stopped by the writer before its next chunk,
    /// which then reports [`FileEvent::Canceled`]. An inbound file is
    /// abandoned right away: its temp file is removed, `Canceled` is
    /// emitted here and the reader discards the chunks still in flight.
    pub fn cancel_file(
        &self,
        contract: &TransferProtocol,
    ) -> Result<TransferringFile, TransferError> {
        let inbound = {
            let mut transfers = self.shared.lock();
            if let Some(file) = transfers.outbound.clone() {
                drop(transfers);
                self.commands
                    .send(WriterCommand::CancelFile)
                    .map_err(|_| TransferError::EngineClosed)?;
                return Ok(file);
            }

            let file = transfers
                .inbound
                .take()
                .ok_or(TransferError::NoActiveTransfer)?;
            transfers.inbound_canceled = Some(file.uid);
            // Emitted under the lock so the reader cannot slip a progress
            // event in after it.
            self.shared.emit_file(FileEvent::Canceled {
                file: file.clone(),
                by_partner: false,
            });
            file
        };

        tracing::debug!(id = %self.id, uid = %inbound.uid, "inbound file canceled locally");
        let _ = std::fs::remove_file(&inbound.local_path);
        self.send_frame(contract.file_cancel(inbound.uid))?;
        Ok(inbound)
    }

    /// Flushes queued frames, writes `farewell` if given, and closes the
    /// channel. Events emitted after this call are not delivered to
    /// anyone who dropped the event receiver.
    pub fn close(mut self, farewell: Option<Frame>) {
        self.closing = true;
        if self.commands.send(WriterCommand::Close(farewell)).is_err() {
            self.reader.abort();
        }
        tracing::debug!(id = %self.id, "transfer engine closing");
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        if !self.closing {
            self.reader.abort();
            self.writer.abort();
        }
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closing", &self.closing)
            .finish()
    }
}
