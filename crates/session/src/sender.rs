//! Sender half of the transfer engine.
//!
//! An offer sends HEADER, parks a [`PendingAck`] and waits for the peer's
//! answer. Once accepted, the file is streamed one chunk per driver
//! iteration so transport events and commands are serviced between chunks.

use std::future::pending;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use sendover_protocol::{ConnectionState, FileHeader, Packet, TransferProgress, TransferRole, TransferStatus};
use sendover_transfer::{ChunkReader, FileSource, TransferError, bundle_name};

use crate::session::Session;
use crate::transport::Transport;

/// The single outstanding handshake continuation.
///
/// Resolved at most once; dropping it resolves the waiter as a failure.
pub(crate) struct PendingAck {
    pub(crate) file_id: String,
    pub(crate) tx: oneshot::Sender<bool>,
}

/// An offered file on its way out.
pub(crate) struct Outbound {
    file_id: String,
    reader: ChunkReader,
    phase: Phase,
}

enum Phase {
    AwaitingAnswer(oneshot::Receiver<bool>),
    Streaming { throttle_until: Option<Instant> },
}

/// What the outbound side is ready to do next.
pub(crate) enum OutboundWake {
    /// The peer answered, or the answer can no longer arrive.
    Answer(Result<bool, oneshot::error::RecvError>),
    /// Time to send the next chunk (or END).
    Step,
}

/// Completes when the outbound transfer can make progress.
pub(crate) async fn next_step(outbound: &mut Option<Outbound>) -> OutboundWake {
    let Some(out) = outbound.as_mut() else {
        return pending().await;
    };
    match &mut out.phase {
        Phase::AwaitingAnswer(rx) => OutboundWake::Answer(rx.await),
        Phase::Streaming { throttle_until } => {
            match *throttle_until {
                Some(at) => tokio::time::sleep_until(at).await,
                None => tokio::task::yield_now().await,
            }
            OutboundWake::Step
        }
    }
}

enum StepOutcome {
    Sent { index: u64, sent_to: u64, len: u64 },
    Finished { file_id: String },
    Failed(String),
    Throttled,
}

impl<T: Transport> Session<T> {
    /// Offers `files` to the connected peer.
    pub(crate) fn offer(&mut self, files: Vec<Box<dyn FileSource>>) {
        let now = Instant::now();
        if self.lifecycle.state != ConnectionState::Connected || files.is_empty() {
            self.notices.error("Not connected or no files selected", now);
            return;
        }
        if self.transfer.status.is_active() {
            warn!(status = ?self.transfer.status, "offer ignored: transfer already active");
            self.notices.warning("A transfer is already in progress", now);
            return;
        }

        let source = match self.prepare_source(files) {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "failed to prepare files");
                self.clear_transfer();
                self.transfer = TransferProgress::new(
                    TransferRole::Sender,
                    "",
                    "",
                    0,
                    TransferStatus::Error,
                );
                self.transfer.error_message = Some("Failed to prepare files for sending".into());
                self.notices.error("Failed to prepare files", now);
                return;
            }
        };

        let file_id = Uuid::new_v4().to_string();
        let reader = ChunkReader::new(source, self.config.chunk_size);
        let header = FileHeader {
            id: file_id.clone(),
            name: reader.name().to_string(),
            size: reader.file_size(),
            mime_type: reader.mime_type().to_string(),
            chunk_count: reader.chunk_count(),
        };

        self.clear_transfer();
        self.transfer = TransferProgress::new(
            TransferRole::Sender,
            &file_id,
            &header.name,
            header.size,
            TransferStatus::Waiting,
        );

        if !self.send_packet(&Packet::Header(header.clone())) {
            self.interrupt_outbound();
            return;
        }

        info!(
            file = %file_id,
            name = %header.name,
            size = header.size,
            chunks = header.chunk_count,
            "offered file"
        );
        let (tx, rx) = oneshot::channel();
        self.pending_ack = Some(PendingAck {
            file_id: file_id.clone(),
            tx,
        });
        self.outbound = Some(Outbound {
            file_id,
            reader,
            phase: Phase::AwaitingAnswer(rx),
        });
    }

    fn prepare_source(
        &mut self,
        mut files: Vec<Box<dyn FileSource>>,
    ) -> Result<Box<dyn FileSource>, TransferError> {
        if files.len() == 1
            && let Some(file) = files.pop()
        {
            return Ok(file);
        }
        let bundler = self
            .bundler
            .as_mut()
            .ok_or_else(|| TransferError::Bundle("no bundler configured".into()))?;
        let name = bundle_name(Utc::now());
        debug!(files = files.len(), %name, "bundling files");
        bundler.bundle(files, &name)
    }

    /// Applies the peer's answer to the pending offer.
    pub(crate) fn on_answer(&mut self, answer: Result<bool, oneshot::error::RecvError>) {
        self.pending_ack = None;
        let now = Instant::now();
        match answer {
            Ok(true) => {
                let Some(out) = self.outbound.as_mut() else {
                    return;
                };
                info!(file = %out.file_id, "offer accepted");
                out.phase = Phase::Streaming {
                    throttle_until: None,
                };
                self.transfer.status = TransferStatus::Transferring;
                self.speed.reset();
                self.speed.add_sample(0, now.into_std());
            }
            Ok(false) => {
                info!(file = %self.transfer.file_id, "offer declined");
                self.outbound = None;
                self.transfer.fail("Transfer declined by peer");
                self.notices.warning("Peer declined the transfer", now);
            }
            Err(_) => {
                warn!(file = %self.transfer.file_id, "offer abandoned before an answer");
                self.interrupt_outbound();
            }
        }
    }

    /// Sends the next chunk, or END once the file is exhausted.
    pub(crate) fn step_outbound(&mut self) {
        let now = Instant::now();
        let buffered = self.transport.buffered_amount();
        let Some(out) = self.outbound.as_mut() else {
            return;
        };

        let outcome = if buffered > self.config.backpressure_watermark {
            out.phase = Phase::Streaming {
                throttle_until: Some(now + self.config.backpressure_poll),
            };
            StepOutcome::Throttled
        } else {
            out.phase = Phase::Streaming {
                throttle_until: None,
            };
            match out.reader.next_chunk() {
                Ok(Some(chunk)) => {
                    let len = chunk.data.len() as u64;
                    let sent_to = chunk.offset + len;
                    let index = chunk.index;
                    match self.transport.send(&Packet::chunk(chunk.index, chunk.data)) {
                        Ok(()) => StepOutcome::Sent { index, sent_to, len },
                        Err(e) => StepOutcome::Failed(e.to_string()),
                    }
                }
                Ok(None) => StepOutcome::Finished {
                    file_id: out.file_id.clone(),
                },
                Err(e) => StepOutcome::Failed(e.to_string()),
            }
        };

        match outcome {
            StepOutcome::Throttled => trace!(buffered, "backpressure pause"),
            StepOutcome::Sent { index, sent_to, len } => {
                trace!(index, sent_to, "chunk sent");
                self.transfer.advance_to(sent_to);
                self.speed.add_sample(len, now.into_std());
                self.transfer.speed = self.speed.display();
            }
            StepOutcome::Finished { file_id } => {
                self.outbound = None;
                if !self.send_packet(&Packet::end(&file_id)) {
                    self.interrupt_outbound();
                    return;
                }
                info!(file = %file_id, size = self.transfer.total_size, "file sent");
                self.transfer.complete();
                self.notices.success("File sent successfully", now);
            }
            StepOutcome::Failed(reason) => {
                warn!(file = %self.transfer.file_id, %reason, "streaming failed");
                self.interrupt_outbound();
            }
        }
    }

    /// Abandons the outbound transfer after a read or send failure.
    pub(crate) fn interrupt_outbound(&mut self) {
        self.pending_ack = None;
        self.outbound = None;
        self.transfer.fail("Connection lost or transfer failed");
        self.notices.error("Transfer interrupted", Instant::now());
    }
}
