//! Inbound packet dispatch.
//!
//! Packets are handled one at a time, in arrival order. Every handler is a
//! plain state mutation; the only packet ever sent in response is a PONG.

use tracing::{trace, warn};

use sendover_protocol::Packet;

use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    pub(crate) fn dispatch(&mut self, packet: Packet) {
        trace!(kind = %packet.packet_type(), "packet");
        match packet {
            Packet::Ping(ts) => {
                self.send_packet(&Packet::Pong(ts));
            }
            Packet::Pong(ts) => {
                self.latency.record_pong(ts.timestamp);
            }
            Packet::Header(header) => self.on_header(header),
            Packet::Ack(file) => self.resolve_pending_ack(&file.id, true),
            Packet::Reject(file) => self.resolve_pending_ack(&file.id, false),
            Packet::Chunk(chunk) => self.on_chunk(chunk),
            Packet::End(file) => self.on_end(&file.id),
        }
    }

    /// Hands the peer's answer to the waiting offer.
    ///
    /// Answers nobody is waiting for point at a desynchronized peer; they
    /// are logged and dropped.
    fn resolve_pending_ack(&mut self, file_id: &str, accepted: bool) {
        match self.pending_ack.take() {
            Some(pending) if pending.file_id == file_id => {
                if pending.tx.send(accepted).is_err() {
                    warn!(file = %file_id, "answer arrived after the offer was abandoned");
                }
            }
            Some(pending) => {
                warn!(
                    expected = %pending.file_id,
                    got = %file_id,
                    accepted,
                    "answer for an unknown file dropped"
                );
                self.pending_ack = Some(pending);
            }
            None => {
                warn!(file = %file_id, accepted, "answer with no pending offer dropped");
            }
        }
    }
}
