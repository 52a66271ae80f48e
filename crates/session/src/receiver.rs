//! Receiver half of the transfer engine.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use sendover_protocol::{
    ConnectionState, FileChunk, FileHeader, Packet, TransferProgress, TransferRole, TransferStatus,
};
use sendover_transfer::{Artifact, AssemblyBuffer};

use crate::session::Session;
use crate::transport::Transport;

/// An announced incoming file and the bytes received for it so far.
pub(crate) struct Inbound {
    pub(crate) header: FileHeader,
    pub(crate) buffer: AssemblyBuffer,
}

impl<T: Transport> Session<T> {
    pub(crate) fn on_header(&mut self, header: FileHeader) {
        if self.transfer.status.is_active() {
            warn!(
                status = ?self.transfer.status,
                file = %header.id,
                "header ignored: transfer already active"
            );
            return;
        }
        info!(
            file = %header.id,
            name = %header.name,
            size = header.size,
            chunks = header.chunk_count,
            "incoming offer"
        );
        self.clear_transfer();
        self.transfer = TransferProgress::new(
            TransferRole::Receiver,
            &header.id,
            &header.name,
            header.size,
            TransferStatus::Incoming,
        );
        self.inbound = Some(Inbound {
            header,
            buffer: AssemblyBuffer::new(),
        });
    }

    pub(crate) fn on_chunk(&mut self, chunk: FileChunk) {
        let accepted = self.transfer.role == TransferRole::Receiver
            && self.transfer.status == TransferStatus::Transferring;
        let Some(inbound) = self.inbound.as_mut().filter(|_| accepted) else {
            debug!(index = chunk.index, status = ?self.transfer.status, "chunk dropped");
            return;
        };

        let len = chunk.data.len() as u64;
        if inbound.buffer.received() + len > inbound.header.size {
            warn!(
                index = chunk.index,
                received = inbound.buffer.received(),
                len,
                size = inbound.header.size,
                "chunk overflows announced size, dropped"
            );
            return;
        }

        let received = inbound.buffer.push(chunk.data);
        self.transfer.advance_to(received);
        self.transfer.status = TransferStatus::Transferring;
        self.speed.add_sample(len, Instant::now().into_std());
        self.transfer.speed = self.speed.display();
    }

    pub(crate) fn on_end(&mut self, file_id: &str) {
        let accepted = self.transfer.role == TransferRole::Receiver
            && self.transfer.status == TransferStatus::Transferring;
        let Some(inbound) = self
            .inbound
            .as_mut()
            .filter(|i| accepted && i.header.id == file_id)
        else {
            warn!(file = %file_id, status = ?self.transfer.status, "unexpected end dropped");
            return;
        };

        let received = inbound.buffer.received();
        if received != inbound.header.size {
            warn!(
                file = %file_id,
                received,
                size = inbound.header.size,
                "end before all bytes arrived"
            );
        }
        let chunks = inbound.buffer.chunk_count();
        let artifact = inbound
            .buffer
            .finalize(&inbound.header.name, &inbound.header.mime_type);
        info!(file = %file_id, bytes = artifact.len(), chunks, "file received");

        self.transfer.complete();
        self.notices.success("File transfer completed!", Instant::now());
    }

    /// Accepts the incoming offer. Silent no-op unless one is waiting.
    pub(crate) fn accept(&mut self) {
        if self.transfer.status != TransferStatus::Incoming
            || self.lifecycle.state != ConnectionState::Connected
        {
            debug!(status = ?self.transfer.status, state = ?self.lifecycle.state, "accept ignored");
            return;
        }
        let file_id = self.transfer.file_id.clone();
        if !self.send_packet(&Packet::ack(&file_id)) {
            self.transfer.fail("Connection lost or transfer failed");
            self.notices.error("Transfer interrupted", Instant::now());
            return;
        }
        info!(file = %file_id, "offer accepted locally");
        self.transfer.status = TransferStatus::Transferring;
        self.speed.reset();
        self.speed.add_sample(0, Instant::now().into_std());
    }

    /// Declines the incoming offer.
    pub(crate) fn reject(&mut self) {
        if self.transfer.status != TransferStatus::Incoming {
            debug!(status = ?self.transfer.status, "reject ignored");
            return;
        }
        let file_id = self.transfer.file_id.clone();
        self.send_packet(&Packet::reject(&file_id));
        info!(file = %file_id, "offer rejected locally");
        self.clear_transfer();
        self.notices.info("File request rejected", Instant::now());
    }

    /// Hands out the completed download, if there is one.
    pub(crate) fn materialize_download(&mut self) -> Option<Artifact> {
        if self.transfer.role != TransferRole::Receiver
            || self.transfer.status != TransferStatus::Completed
        {
            return None;
        }
        let artifact = self
            .inbound
            .as_ref()
            .and_then(|i| i.buffer.artifact())
            .cloned()?;
        info!(name = %artifact.file_name, bytes = artifact.len(), "download started");
        self.notices.success("Download started", Instant::now());
        Some(artifact)
    }

    /// Returns the transfer to idle.
    ///
    /// A pending offer is declined; a transfer in flight is left alone. After
    /// a fatal error this also brings the connection back to life.
    pub(crate) fn reset(&mut self) {
        match self.transfer.status {
            TransferStatus::Incoming => self.reject(),
            TransferStatus::Waiting | TransferStatus::Transferring => {
                warn!(status = ?self.transfer.status, "reset ignored during transfer");
            }
            TransferStatus::Idle | TransferStatus::Completed | TransferStatus::Error => {
                self.clear_transfer();
            }
        }

        if self.lifecycle.state == ConnectionState::Error {
            info!("resetting after fatal error");
            self.lifecycle.state = ConnectionState::Disconnected;
            self.lifecycle.collisions = 0;
            self.reinitialize();
        }
    }

    /// Drops transfer progress and any received bytes.
    pub(crate) fn clear_transfer(&mut self) {
        self.transfer = TransferProgress::default();
        self.inbound = None;
        self.speed.reset();
    }
}
