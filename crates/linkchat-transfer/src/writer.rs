//! The writer task: the only code that writes to a channel.
//!
//! Commands arrive on one queue and are written in order. While a file is
//! streaming, the queue is polled with `try_recv` between chunks, so a text
//! frame queued mid-transfer goes out between two chunks and never inside
//! one.
//!
//! ```text
//! FileStart │ chunk │ chunk │ Message │ chunk │ Delivered │ chunk │ FileEnd
//! ```

use std::sync::Arc;

use linkchat_protocol::{Frame, FrameCodec, JsonCodec, chunk_header};
use linkchat_transport::ChannelId;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::AbortHandle;

use crate::engine::Shared;
use crate::{EngineEvent, CloseReason, FileEvent, TransferError, TransferringFile};

/// A file accepted by the engine, with the frames that frame it.
pub(crate) struct OutboundFile {
    pub(crate) start: Frame,
    pub(crate) end: Frame,
    pub(crate) cancel: Frame,
    pub(crate) file: TransferringFile,
}

pub(crate) enum WriterCommand {
    Frame(Frame),
    File(OutboundFile),
    CancelFile,
    /// Write the optional farewell frame, then shut the channel down.
    Close(Option<Frame>),
}

/// What the command loop does after a file finished streaming.
enum Flow {
    Continue,
    Closed,
}

pub(crate) struct Writer<W> {
    id: ChannelId,
    sink: BufWriter<W>,
    codec: FrameCodec<JsonCodec>,
    commands: mpsc::UnboundedReceiver<WriterCommand>,
    shared: Arc<Shared>,
    chunk_size: usize,
    reader: AbortHandle,
}

impl<W: AsyncWrite + Send + Unpin + 'static> Writer<W> {
    pub(crate) fn new(
        id: ChannelId,
        sink: W,
        commands: mpsc::UnboundedReceiver<WriterCommand>,
        shared: Arc<Shared>,
        chunk_size: usize,
        reader: AbortHandle,
    ) -> Self {
        Self {
            id,
            sink: BufWriter::new(sink),
            codec: FrameCodec::new(JsonCodec),
            commands,
            shared,
            chunk_size,
            reader,
        }
    }

    pub(crate) async fn run(mut self) {
        match self.serve().await {
            Ok(()) => tracing::debug!(id = %self.id, "writer stopped"),
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "write failed");
                self.shared.emit(EngineEvent::Closed(CloseReason::Failed(e)));
            }
        }
        // Once the writer is gone the channel is unusable in both
        // directions.
        self.reader.abort();
    }

    async fn serve(&mut self) -> Result<(), TransferError> {
        while let Some(command) = self.commands.recv().await {
            match command {
                WriterCommand::Frame(frame) => self.write_frame(frame).await?,
                WriterCommand::File(job) => {
                    if let Flow::Closed = self.stream_file(job).await? {
                        return Ok(());
                    }
                }
                WriterCommand::CancelFile => {
                    tracing::debug!(id = %self.id, "cancel after the file already ended, ignored");
                }
                WriterCommand::Close(farewell) => {
                    self.shutdown(farewell).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn stream_file(
        &mut self,
        job: OutboundFile,
    ) -> Result<Flow, TransferError> {
        let OutboundFile {
            start,
            end,
            cancel,
            file,
        } = job;

        let mut source = match tokio::fs::File::open(&file.local_path).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(id = %self.id, uid = %file.uid, error = %e, "cannot open file to send");
                self.finish(FileEvent::SendingFailed {
                    file,
                    reason: e.to_string(),
                });
                return Ok(Flow::Continue);
            }
        };

        self.write_frame(start).await?;
        self.shared
            .emit_file(FileEvent::SendingStarted(file.clone()));

        let mut buf = vec![0u8; self.chunk_size];
        let mut sent: u64 = 0;

        while sent < file.size {
            // Frames queued while streaming go out between chunks.
            loop {
                match self.commands.try_recv() {
                    Ok(WriterCommand::Frame(frame)) => {
                        self.write_frame(frame).await?;
                    }
                    Ok(WriterCommand::CancelFile) => {
                        self.write_frame(cancel).await?;
                        tracing::debug!(id = %self.id, uid = %file.uid, sent, "outbound file canceled locally");
                        self.finish(FileEvent::Canceled {
                            file,
                            by_partner: false,
                        });
                        return Ok(Flow::Continue);
                    }
                    Ok(WriterCommand::Close(farewell)) => {
                        self.shared.lock().outbound = None;
                        self.shutdown(farewell).await?;
                        return Ok(Flow::Closed);
                    }
                    Ok(WriterCommand::File(other)) => {
                        // The handle refuses a second file while one is
                        // active, so this is unreachable in practice.
                        tracing::warn!(id = %self.id, uid = %other.file.uid, "second outbound file dropped");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        break;
                    }
                }
            }

            if self.take_peer_cancel() {
                tracing::debug!(id = %self.id, uid = %file.uid, sent, "outbound file canceled by peer");
                self.finish(FileEvent::Canceled {
                    file,
                    by_partner: true,
                });
                return Ok(Flow::Continue);
            }

            let want = buf.len().min(usize::try_from(file.size - sent).unwrap_or(usize::MAX));
            let read = match source.read(&mut buf[..want]).await {
                Ok(0) => Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shrank while sending",
                )),
                other => other,
            };
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(id = %self.id, uid = %file.uid, error = %e, "reading file to send failed");
                    self.write_frame(cancel).await?;
                    self.finish(FileEvent::SendingFailed {
                        file,
                        reason: e.to_string(),
                    });
                    return Ok(Flow::Continue);
                }
            };

            self.write_chunk(&buf[..n]).await?;
            sent += n as u64;
            tracing::trace!(id = %self.id, uid = %file.uid, sent, size = file.size, "chunk written");
            self.shared.emit_file(FileEvent::SendingProgress {
                uid: file.uid,
                sent,
                size: file.size,
            });
        }

        self.write_frame(end).await?;
        tracing::info!(id = %self.id, uid = %file.uid, name = %file.name, size = file.size, "file sent");
        self.finish(FileEvent::SendingFinished(file));
        Ok(Flow::Continue)
    }

    /// Clears the outbound slot and emits the terminal event under the same
    /// lock, so `transferring_file()` never reports a finished transfer.
    fn finish(&self, event: FileEvent) {
        let mut transfers = self.shared.lock();
        transfers.outbound = None;
        transfers.outbound_canceled_by_peer = false;
        self.shared.emit_file(event);
    }

    fn take_peer_cancel(&self) -> bool {
        std::mem::take(&mut self.shared.lock().outbound_canceled_by_peer)
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransferError> {
        let record = self.codec.encode(&frame)?;
        self.sink.write_all(&record).await?;
        self.sink.flush().await?;
        tracing::debug!(id = %self.id, kind = ?frame.kind, uid = %frame.uid, "frame written");
        self.shared.emit(EngineEvent::FrameSent(frame));
        Ok(())
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let len = u32::try_from(data.len()).map_err(|_| {
            TransferError::ChunkTooLarge(data.len())
        })?;
        self.sink.write_all(&chunk_header(len)).await?;
        self.sink.write_all(data).await?;
        self.sink.flush().await?;
        Ok(())
    }

    async fn shutdown(
        &mut self,
        farewell: Option<Frame>,
    ) -> Result<(), TransferError> {
        if let Some(frame) = farewell {
            self.write_frame(frame).await?;
        }
        self.sink.flush().await?;
        // The peer may already be gone; a failed shutdown changes nothing.
        let _ = self.sink.shutdown().await;
        Ok(())
    }
}
