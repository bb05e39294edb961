//! The reader task: one loop that owns the read half of a channel.
//!
//! Each iteration peeks one byte to decide what comes next:
//!
//! - [`CHUNK_TAG`] → a raw file chunk for the inbound transfer.
//! - anything else → a newline-terminated frame record.
//!
//! File-control frames (`FileStart`, `FileEnd`, `FileCancel`) are consumed
//! here. Every other frame is forwarded to the owner in read order.
//!
//! # Inbound transfer states
//!
//! ```text
//!            FileStart                    FileEnd (size matches)
//!   Idle ──────────────→ Receiving ────────────────────────────→ Idle
//!     ↑                    │  local cancel / disk error              │
//!     │                    ↓                                         │
//!     └──── FileEnd, ─── Draining (discard the rest of the chunks) ──┘
//!           FileCancel,
//!           next FileStart
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkchat_protocol::{
    CHUNK_TAG, Frame, FrameCodec, FrameType, JsonCodec, ProtocolError,
    RECORD_DELIMITER, Uid, chunk_len,
};
use linkchat_transport::ChannelId;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader,
};

use crate::engine::Shared;
use crate::files::{sanitize_file_name, temp_path, unique_destination};
use crate::{
    CloseReason, EngineConfig, EngineEvent, FileEvent, MAX_CHUNK_LEN,
    TransferDirection, TransferError, TransferringFile,
};

/// A file being written to disk.
struct Receiving {
    file: TransferringFile,
    temp_path: PathBuf,
    out: Option<tokio::fs::File>,
    received: u64,
}

impl Receiving {
    fn remaining(&self) -> u64 {
        self.file.size.saturating_sub(self.received)
    }
}

impl Drop for Receiving {
    /// Whatever ends a transfer early (cancel, failure, the task being
    /// aborted) leaves no partial file behind. After a successful rename
    /// the temp path no longer exists and this is a no-op.
    fn drop(&mut self) {
        drop(self.out.take());
        let _ = std::fs::remove_file(&self.temp_path);
    }
}

enum Inbound {
    Idle,
    Receiving(Receiving),
    Draining { uid: Uid, remaining: u64 },
}

pub(crate) struct Reader<R> {
    id: ChannelId,
    source: BufReader<R>,
    codec: FrameCodec<JsonCodec>,
    shared: Arc<Shared>,
    files_directory: PathBuf,
    max_record_len: usize,
    inbound: Inbound,
}

impl<R: AsyncRead + Send + Unpin + 'static> Reader<R> {
    pub(crate) fn new(
        id: ChannelId,
        source: R,
        shared: Arc<Shared>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id,
            source: BufReader::new(source),
            codec: FrameCodec::new(JsonCodec),
            shared,
            files_directory: config.files_directory.clone(),
            max_record_len: config.max_record_len,
            inbound: Inbound::Idle,
        }
    }

    pub(crate) async fn run(mut self) {
        let reason = match self.serve().await {
            Ok(()) => {
                tracing::debug!(id = %self.id, "channel reached end of stream");
                CloseReason::EndOfStream
            }
            Err(e) => {
                if e.is_protocol_violation() {
                    tracing::warn!(id = %self.id, error = %e, "protocol violation");
                } else {
                    tracing::debug!(id = %self.id, error = %e, "read failed");
                }
                CloseReason::Failed(e)
            }
        };

        self.inbound = Inbound::Idle;
        self.shared.lock().inbound = None;
        self.shared.emit(EngineEvent::Closed(reason));
    }

    async fn serve(&mut self) -> Result<(), TransferError> {
        loop {
            let first = match self.source.fill_buf().await?.first() {
                Some(byte) => *byte,
                None => return Ok(()),
            };

            if first == CHUNK_TAG {
                let data = self.read_chunk().await?;
                self.on_chunk(&data).await?;
            } else {
                let frame = self.read_frame().await?;
                self.on_frame(frame).await?;
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>, TransferError> {
        self.source.consume(1);
        let mut header = [0u8; 4];
        self.source.read_exact(&mut header).await?;

        let len = chunk_len(header) as usize;
        if len > MAX_CHUNK_LEN {
            return Err(TransferError::ChunkTooLarge(len));
        }
        let mut data = vec![0u8; len];
        self.source.read_exact(&mut data).await?;
        Ok(data)
    }

    async fn read_frame(&mut self) -> Result<Frame, TransferError> {
        let limit = self.max_record_len as u64 + 1;
        let mut record = Vec::new();
        (&mut self.source)
            .take(limit)
            .read_until(RECORD_DELIMITER, &mut record)
            .await?;

        if record.last() != Some(&RECORD_DELIMITER) {
            if record.len() as u64 >= limit {
                return Err(ProtocolError::RecordTooLong(self.max_record_len).into());
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "channel closed inside a frame record",
            )
            .into());
        }
        Ok(self.codec.decode(&record)?)
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    async fn on_frame(&mut self, frame: Frame) -> Result<(), TransferError> {
        tracing::debug!(id = %self.id, kind = ?frame.kind, uid = %frame.uid, "frame received");
        match frame.kind {
            FrameType::FileStart => self.on_file_start(frame).await,
            FrameType::FileEnd => {
                self.on_file_end(frame.uid).await;
                Ok(())
            }
            FrameType::FileCancel => {
                self.on_file_cancel(frame.uid);
                Ok(())
            }
            // The peer may start a file right behind its accept, before the
            // session has handled the answer. Frames are read in order, so
            // opening the gate here keeps that sequence valid.
            FrameType::ConnectResponse if frame.flag => {
                self.shared.enable_files();
                self.shared.emit(EngineEvent::FrameReceived(frame));
                Ok(())
            }
            _ => {
                self.shared.emit(EngineEvent::FrameReceived(frame));
                Ok(())
            }
        }
    }

    async fn on_file_start(&mut self, frame: Frame) -> Result<(), TransferError> {
        if !self.shared.files_enabled() {
            return Err(TransferError::FileBeforeHandshake);
        }
        if let Inbound::Receiving(r) = &self.inbound {
            // A file the local user canceled may never see its FileEnd.
            if !self.canceled_locally(r.file.uid) {
                return Err(TransferError::OverlappingInboundFile(frame.uid));
            }
        }
        let body = frame.file_start()?;

        let name = sanitize_file_name(&body.file_name);
        let temp = temp_path(&self.files_directory, &name);
        let file = TransferringFile {
            uid: frame.uid,
            name,
            size: body.file_size,
            kind: body.kind,
            direction: TransferDirection::Inbound,
            local_path: temp.clone(),
        };

        match open_temp(&self.files_directory, &temp).await {
            Ok(out) => {
                tracing::info!(id = %self.id, uid = %file.uid, name = %file.name, size = file.size, "receiving file");
                {
                    let mut transfers = self.shared.lock();
                    transfers.inbound = Some(file.clone());
                    transfers.inbound_canceled = None;
                    self.shared
                        .emit_file(FileEvent::ReceivingStarted(file.clone()));
                }
                self.inbound = Inbound::Receiving(Receiving {
                    file,
                    temp_path: temp,
                    out: Some(out),
                    received: 0,
                });
            }
            Err(e) => {
                tracing::warn!(id = %self.id, uid = %file.uid, error = %e, "cannot create file to receive into");
                self.inbound = Inbound::Draining {
                    uid: file.uid,
                    remaining: file.size,
                };
                self.shared.emit_file(FileEvent::ReceivingFailed {
                    file,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn on_file_end(&mut self, uid: Uid) {
        match std::mem::replace(&mut self.inbound, Inbound::Idle) {
            Inbound::Receiving(r) if r.file.uid == uid => self.complete(r).await,
            Inbound::Draining { uid: drained, .. } if drained == uid => {
                tracing::debug!(id = %self.id, %uid, "discarded file ended");
            }
            other => {
                tracing::debug!(id = %self.id, %uid, "FileEnd for no active file, ignored");
                self.inbound = other;
            }
        }
    }

    fn on_file_cancel(&mut self, uid: Uid) {
        match std::mem::replace(&mut self.inbound, Inbound::Idle) {
            Inbound::Receiving(r) if r.file.uid == uid => {
                tracing::info!(id = %self.id, %uid, received = r.received, "inbound file canceled by peer");
                let file = r.file.clone();
                drop(r);
                let mut transfers = self.shared.lock();
                if transfers.inbound_canceled != Some(uid) {
                    transfers.inbound = None;
                    self.shared.emit_file(FileEvent::Canceled {
                        file,
                        by_partner: true,
                    });
                }
            }
            Inbound::Draining { uid: drained, .. } if drained == uid => {}
            other => {
                self.inbound = other;
                let mut transfers = self.shared.lock();
                if transfers.outbound.as_ref().is_some_and(|f| f.uid == uid) {
                    transfers.outbound_canceled_by_peer = true;
                } else {
                    tracing::debug!(id = %self.id, %uid, "FileCancel for no active file, ignored");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Chunks
    // -----------------------------------------------------------------------

    async fn on_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let len = data.len() as u64;
        let next = match std::mem::replace(&mut self.inbound, Inbound::Idle) {
            Inbound::Idle => {
                return Err(TransferError::OutOfSequenceChunk { len: data.len() });
            }
            Inbound::Draining { uid, remaining } => {
                if len > remaining {
                    return Err(TransferError::OutOfSequenceChunk { len: data.len() });
                }
                Inbound::Draining {
                    uid,
                    remaining: remaining - len,
                }
            }
            Inbound::Receiving(r) => self.write_chunk(r, data).await?,
        };
        self.inbound = next;
        Ok(())
    }

    async fn write_chunk(
        &mut self,
        mut r: Receiving,
        data: &[u8],
    ) -> Result<Inbound, TransferError> {
        let len = data.len() as u64;
        if len > r.remaining() {
            return Err(TransferError::OutOfSequenceChunk { len: data.len() });
        }
        let uid = r.file.uid;

        if self.canceled_locally(uid) {
            // Dropping `r` removes the temp file.
            return Ok(Inbound::Draining {
                uid,
                remaining: r.remaining() - len,
            });
        }

        let written = match r.out.as_mut() {
            Some(out) => out.write_all(data).await,
            None => Ok(()),
        };
        if let Err(e) = written {
            tracing::warn!(id = %self.id, %uid, error = %e, "writing received file failed");
            let remaining = r.remaining() - len;
            self.fail(r, e.to_string());
            return Ok(Inbound::Draining { uid, remaining });
        }

        r.received += len;
        tracing::trace!(id = %self.id, %uid, received = r.received, size = r.file.size, "chunk received");
        {
            let transfers = self.shared.lock();
            if transfers.inbound_canceled != Some(uid) {
                self.shared.emit_file(FileEvent::ReceivingProgress {
                    uid,
                    received: r.received,
                    size: r.file.size,
                });
            }
        }
        Ok(Inbound::Receiving(r))
    }

    /// Moves a fully received file to its final place.
    async fn complete(&mut self, mut r: Receiving) {
        let uid = r.file.uid;
        if self.canceled_locally(uid) {
            return;
        }
        if r.received != r.file.size {
            let reason = format!(
                "file ended after {} of {} bytes",
                r.received, r.file.size
            );
            self.fail(r, reason);
            return;
        }

        let flushed = match r.out.take() {
            Some(mut out) => out.flush().await,
            None => Ok(()),
        };
        let destination = unique_destination(&self.files_directory, &r.file.name).await;
        let moved = match flushed {
            Ok(()) => tokio::fs::rename(&r.temp_path, &destination).await,
            Err(e) => Err(e),
        };
        if let Err(e) = moved {
            tracing::warn!(id = %self.id, %uid, error = %e, "storing received file failed");
            self.fail(r, e.to_string());
            return;
        }

        let mut file = r.file.clone();
        file.local_path = destination;
        let mut transfers = self.shared.lock();
        if transfers.inbound_canceled == Some(uid) {
            // Canceled while the rename was in flight.
            drop(transfers);
            let _ = std::fs::remove_file(&file.local_path);
            return;
        }
        tracing::info!(id = %self.id, %uid, path = %file.local_path.display(), "file received");
        transfers.inbound = None;
        self.shared.emit_file(FileEvent::ReceivingFinished(file));
    }

    /// Removes the partial file, then reports the failure.
    fn fail(&self, r: Receiving, reason: String) {
        let file = r.file.clone();
        drop(r);
        let mut transfers = self.shared.lock();
        transfers.inbound = None;
        self.shared
            .emit_file(FileEvent::ReceivingFailed { file, reason });
    }

    fn canceled_locally(&self, uid: Uid) -> bool {
        self.shared.lock().inbound_canceled == Some(uid)
    }
}

async fn open_temp(dir: &Path, path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::File::create(path).await
}
