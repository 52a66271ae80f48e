//! Round-trip latency probe riding the data channel.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::trace;

use sendover_protocol::Packet;

/// Periodic PING emitter and PONG evaluator.
///
/// Timestamps are milliseconds on a session-local monotonic clock; only the
/// sender ever interprets them, since a PONG echoes the PING it answers.
pub(crate) struct LatencyProbe {
    anchor: Instant,
    period: Duration,
    pub(crate) ticker: Option<Interval>,
    latency: Option<Duration>,
}

impl LatencyProbe {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            anchor: Instant::now(),
            period,
            ticker: None,
            latency: None,
        }
    }

    /// Milliseconds since the probe was created.
    pub(crate) fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }

    /// Starts pinging; the first ping goes out one period from now.
    pub(crate) fn start(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Stops pinging and forgets the last measurement.
    pub(crate) fn stop(&mut self) {
        self.ticker = None;
        self.latency = None;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub(crate) fn ping(&self) -> Packet {
        Packet::ping(self.now_ms())
    }

    /// Records the round trip of a PING sent at `timestamp`.
    ///
    /// Last write wins. Ignored while the probe is stopped.
    pub(crate) fn record_pong(&mut self, timestamp: u64) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        let rtt = Duration::from_millis(self.now_ms().saturating_sub(timestamp));
        trace!(rtt_ms = rtt.as_millis() as u64, "latency sample");
        self.latency = Some(rtt);
        self.latency
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

/// Completes on the next tick, or never while the probe is stopped.
pub(crate) async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
