//! In-process transport for tests and loopback transfers.
//!
//! A [`MemoryNetwork`] plays the role of the discovery service and the
//! data channel at once: identifiers are registered in a shared table, and
//! each connection is a pair of ordered pump tasks that carry JSON-encoded
//! packets with an optional one-way delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use sendover_protocol::Packet;

use crate::error::TransportError;
use crate::transport::{Transport, TransportErrorKind, TransportEvent};

/// A packet observed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub from: String,
    pub to: String,
    pub packet: Packet,
}

/// Shared registry and link factory for [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

#[derive(Default)]
struct NetworkInner {
    endpoints: HashMap<String, Arc<Endpoint>>,
    one_way_delay: Duration,
    recorder: Option<Vec<WireRecord>>,
    next_link: u64,
}

struct Endpoint {
    events: mpsc::UnboundedSender<TransportEvent>,
    link: Mutex<Option<LinkEnd>>,
    peak_buffered: AtomicUsize,
}

#[derive(Clone)]
struct LinkEnd {
    id: u64,
    remote: String,
    frames: mpsc::UnboundedSender<Frame>,
    buffered: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

struct Frame {
    bytes: Vec<u8>,
    sent_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Endpoint {
    fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            link: Mutex::new(None),
            peak_buffered: AtomicUsize::new(0),
        })
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("event dropped: endpoint receiver gone");
        }
    }

    /// Removes the link with `link_id`, leaving a newer link untouched.
    fn unlink(&self, link_id: u64) -> bool {
        let mut link = lock(&self.link);
        if link.as_ref().is_some_and(|l| l.id == link_id) {
            *link = None;
            true
        } else {
            false
        }
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network whose links deliver each packet `delay` after it was sent.
    pub fn with_delay(delay: Duration) -> Self {
        let network = Self::new();
        network.set_one_way_delay(delay);
        network
    }

    /// Applies to links opened afterwards.
    pub fn set_one_way_delay(&self, delay: Duration) {
        lock(&self.inner).one_way_delay = delay;
    }

    /// Creates an unregistered transport and its event stream.
    pub fn transport(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = MemoryTransport {
            network: self.clone(),
            endpoint: Endpoint::new(tx),
            id: None,
        };
        (transport, rx)
    }

    /// Occupies `id` with an endpoint nobody listens to.
    pub fn reserve(&self, id: &str) {
        let (tx, _) = mpsc::unbounded_channel();
        lock(&self.inner)
            .endpoints
            .insert(id.to_string(), Endpoint::new(tx));
    }

    pub fn is_registered(&self, id: &str) -> bool {
        lock(&self.inner).endpoints.contains_key(id)
    }

    /// Starts recording every packet sent from now on.
    pub fn record_wire(&self) {
        lock(&self.inner).recorder.get_or_insert_with(Vec::new);
    }

    /// Packets recorded so far, in send order.
    pub fn recorded(&self) -> Vec<WireRecord> {
        lock(&self.inner).recorder.clone().unwrap_or_default()
    }

    /// Highest buffered byte count ever observed on `id`'s outbound side.
    pub fn peak_buffered(&self, id: &str) -> usize {
        lock(&self.inner)
            .endpoints
            .get(id)
            .map(|e| e.peak_buffered.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Delivers `event` to the endpoint registered as `id`.
    pub fn inject(&self, id: &str, event: TransportEvent) -> bool {
        let endpoint = lock(&self.inner).endpoints.get(id).cloned();
        match endpoint {
            Some(endpoint) => {
                endpoint.emit(event);
                true
            }
            None => false,
        }
    }

    /// Drops the connection of `id` as if the network failed. Both ends
    /// observe [`TransportEvent::Close`].
    pub fn sever(&self, id: &str) -> bool {
        let inner = lock(&self.inner);
        let Some(local) = inner.endpoints.get(id).cloned() else {
            return false;
        };
        let Some(link) = lock(&local.link).take() else {
            return false;
        };
        link.cancel.cancel();
        if let Some(remote) = inner.endpoints.get(&link.remote)
            && remote.unlink(link.id)
        {
            remote.emit(TransportEvent::Close);
        }
        local.emit(TransportEvent::Close);
        debug!(id, remote = %link.remote, "link severed");
        true
    }

    fn record(&self, from: &str, to: &str, packet: &Packet) {
        if let Some(recorder) = lock(&self.inner).recorder.as_mut() {
            recorder.push(WireRecord {
                from: from.to_string(),
                to: to.to_string(),
                packet: packet.clone(),
            });
        }
    }
}

/// One peer's handle on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    endpoint: Arc<Endpoint>,
    id: Option<String>,
}

impl MemoryTransport {
    /// Identifier currently registered by this transport.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn current_link(&self) -> Option<LinkEnd> {
        lock(&self.endpoint.link).clone()
    }

    fn unregister(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let mut inner = lock(&self.network.inner);
        if inner
            .endpoints
            .get(&id)
            .is_some_and(|e| Arc::ptr_eq(e, &self.endpoint))
        {
            inner.endpoints.remove(&id);
            debug!(%id, "identifier released");
        }
    }
}

impl Transport for MemoryTransport {
    fn register(&mut self, id: &str) -> Result<(), TransportError> {
        self.unregister();
        let mut inner = lock(&self.network.inner);
        if inner.endpoints.contains_key(id) {
            debug!(id, "identifier taken");
            self.endpoint
                .emit(TransportEvent::PeerError(TransportErrorKind::UnavailableId));
            return Ok(());
        }
        inner
            .endpoints
            .insert(id.to_string(), Arc::clone(&self.endpoint));
        drop(inner);
        self.id = Some(id.to_string());
        self.endpoint.emit(TransportEvent::Registered(id.to_string()));
        Ok(())
    }

    fn connect(&mut self, remote: &str) -> Result<(), TransportError> {
        let local_id = self.id.clone().ok_or(TransportError::NotRegistered)?;
        let mut inner = lock(&self.network.inner);

        let Some(remote_endpoint) = inner.endpoints.get(remote).cloned() else {
            debug!(remote, "connect target not registered");
            self.endpoint
                .emit(TransportEvent::PeerError(TransportErrorKind::PeerUnavailable));
            return Ok(());
        };
        if Arc::ptr_eq(&remote_endpoint, &self.endpoint) {
            return Err(TransportError::Refused("cannot connect to self".into()));
        }
        if lock(&self.endpoint.link).is_some() {
            return Err(TransportError::Refused("already connected".into()));
        }
        if lock(&remote_endpoint.link).is_some() {
            return Err(TransportError::Refused("peer busy".into()));
        }

        inner.next_link += 1;
        let link_id = inner.next_link;
        let delay = inner.one_way_delay;
        drop(inner);

        let cancel = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (back_tx, back_rx) = mpsc::unbounded_channel();
        let out_buffered = Arc::new(AtomicUsize::new(0));
        let back_buffered = Arc::new(AtomicUsize::new(0));

        tokio::spawn(pump(
            out_rx,
            Arc::clone(&out_buffered),
            Arc::clone(&remote_endpoint),
            delay,
            cancel.clone(),
        ));
        tokio::spawn(pump(
            back_rx,
            Arc::clone(&back_buffered),
            Arc::clone(&self.endpoint),
            delay,
            cancel.clone(),
        ));

        *lock(&self.endpoint.link) = Some(LinkEnd {
            id: link_id,
            remote: remote.to_string(),
            frames: out_tx,
            buffered: out_buffered,
            cancel: cancel.clone(),
        });
        *lock(&remote_endpoint.link) = Some(LinkEnd {
            id: link_id,
            remote: local_id.clone(),
            frames: back_tx,
            buffered: back_buffered,
            cancel,
        });

        debug!(local = %local_id, remote, link = link_id, "link opened");
        remote_endpoint.emit(TransportEvent::Incoming { remote: local_id });
        remote_endpoint.emit(TransportEvent::Open);
        self.endpoint.emit(TransportEvent::Open);
        Ok(())
    }

    fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let link = self.current_link().ok_or(TransportError::NotConnected)?;
        let bytes = packet.to_bytes()?;
        let len = bytes.len();

        let buffered = link.buffered.fetch_add(len, Ordering::Relaxed) + len;
        self.endpoint
            .peak_buffered
            .fetch_max(buffered, Ordering::Relaxed);

        link.frames
            .send(Frame {
                bytes,
                sent_at: Instant::now(),
            })
            .map_err(|_| TransportError::NotConnected)?;

        if let Some(from) = self.id.as_deref() {
            self.network.record(from, &link.remote, packet);
        }
        Ok(())
    }

    fn buffered_amount(&self) -> usize {
        self.current_link()
            .map(|l| l.buffered.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn close(&mut self) {
        let Some(link) = lock(&self.endpoint.link).take() else {
            return;
        };
        link.cancel.cancel();
        let remote = lock(&self.network.inner).endpoints.get(&link.remote).cloned();
        if let Some(remote) = remote
            && remote.unlink(link.id)
        {
            remote.emit(TransportEvent::Close);
        }
        debug!(remote = %link.remote, "link closed locally");
    }

    fn destroy(&mut self) {
        self.close();
        self.unregister();
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Carries frames from one end of a link to the other, in order.
async fn pump(
    mut frames: mpsc::UnboundedReceiver<Frame>,
    buffered: Arc<AtomicUsize>,
    target: Arc<Endpoint>,
    delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(frame.sent_at + delay) => {}
            }
        }

        buffered.fetch_sub(frame.bytes.len(), Ordering::Relaxed);
        let event = match Packet::from_slice(&frame.bytes) {
            Ok(packet) => TransportEvent::Message(packet),
            Err(e) => {
                warn!(error = %e, "undecodable frame");
                TransportEvent::ChannelError(format!("undecodable frame: {e}"))
            }
        };
        if target.events.send(event).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("stream open")
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_collision() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();

        a.register("sendover-111111").unwrap();
        assert_eq!(next(&mut a_rx).await, TransportEvent::Registered("sendover-111111".into()));

        b.register("sendover-111111").unwrap();
        assert_eq!(
            next(&mut b_rx).await,
            TransportEvent::PeerError(TransportErrorKind::UnavailableId)
        );
        assert!(b.id().is_none());
    }

    #[tokio::test]
    async fn destroy_releases_identifier() {
        let net = MemoryNetwork::new();
        let (mut a, _a_rx) = net.transport();
        a.register("sendover-222222").unwrap();
        assert!(net.is_registered("sendover-222222"));
        a.destroy();
        assert!(!net.is_registered("sendover-222222"));
    }

    #[tokio::test]
    async fn connect_to_unknown_peer_reports_unavailable() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_rx) = net.transport();
        a.register("sendover-333333").unwrap();
        next(&mut a_rx).await;

        a.connect("sendover-000000").unwrap();
        assert_eq!(
            next(&mut a_rx).await,
            TransportEvent::PeerError(TransportErrorKind::PeerUnavailable)
        );
    }

    #[tokio::test]
    async fn connect_before_register_fails() {
        let net = MemoryNetwork::new();
        let (mut a, _a_rx) = net.transport();
        assert!(matches!(a.connect("x"), Err(TransportError::NotRegistered)));
    }

    #[tokio::test]
    async fn packets_arrive_in_order() {
        let net = MemoryNetwork::new();
        net.record_wire();
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();
        a.register("a").unwrap();
        b.register("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        a.connect("b").unwrap();
        assert_eq!(next(&mut a_rx).await, TransportEvent::Open);
        assert_eq!(next(&mut b_rx).await, TransportEvent::Incoming { remote: "a".into() });
        assert_eq!(next(&mut b_rx).await, TransportEvent::Open);

        for i in 0..10 {
            a.send(&Packet::ping(i)).unwrap();
        }
        for i in 0..10 {
            assert_eq!(next(&mut b_rx).await, TransportEvent::Message(Packet::ping(i)));
        }
        assert_eq!(a.buffered_amount(), 0);

        let recorded = net.recorded();
        assert_eq!(recorded.len(), 10);
        assert_eq!(recorded[0].from, "a");
        assert_eq!(recorded[0].to, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn delay_holds_frames_in_the_buffer() {
        let net = MemoryNetwork::with_delay(Duration::from_millis(100));
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();
        a.register("a").unwrap();
        b.register("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        a.connect("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        next(&mut b_rx).await;

        let start = Instant::now();
        a.send(&Packet::chunk(0, vec![0; 1000])).unwrap();
        assert!(a.buffered_amount() > 1000);
        assert!(net.peak_buffered("a") > 1000);

        assert!(matches!(next(&mut b_rx).await, TransportEvent::Message(Packet::Chunk(_))));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(a.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn local_close_notifies_only_the_remote() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();
        a.register("a").unwrap();
        b.register("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        a.connect("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        next(&mut b_rx).await;

        a.close();
        assert_eq!(next(&mut b_rx).await, TransportEvent::Close);
        assert!(a_rx.try_recv().is_err());
        assert!(matches!(a.send(&Packet::ping(1)), Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn sever_closes_both_ends() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();
        a.register("a").unwrap();
        b.register("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        a.connect("b").unwrap();
        next(&mut a_rx).await;
        next(&mut b_rx).await;
        next(&mut b_rx).await;

        assert!(net.sever("a"));
        assert_eq!(next(&mut a_rx).await, TransportEvent::Close);
        assert_eq!(next(&mut b_rx).await, TransportEvent::Close);
        assert!(!net.sever("a"));
    }

    #[tokio::test]
    async fn busy_peer_refuses_connect() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_rx) = net.transport();
        let (mut b, mut b_rx) = net.transport();
        let (mut c, mut c_rx) = net.transport();
        for (t, rx, id) in [(&mut a, &mut a_rx, "a"), (&mut b, &mut b_rx, "b"), (&mut c, &mut c_rx, "c")] {
            t.register(id).unwrap();
            next(rx).await;
        }
        a.connect("b").unwrap();
        assert!(matches!(c.connect("b"), Err(TransportError::Refused(_))));
        assert!(c_rx.try_recv().is_err());
    }
}
