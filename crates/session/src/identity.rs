//! Ephemeral session identities and their rotation schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use tokio::time::Instant;
use tracing::{debug, info};

use sendover_protocol::ConnectionState;
use sendover_protocol::constants::{CODE_LENGTH, PEER_ID_PREFIX};

/// Delay before rotating an identity that already expired while a
/// connection was up.
const ROTATION_SETTLE: Duration = Duration::from_millis(500);

/// The code this process can currently be reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Six decimal digits, shown to the user.
    pub code: String,
    /// Namespaced identifier registered with the transport.
    pub id: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl PeerIdentity {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Owns the local identity and decides when it may rotate.
pub struct IdentityManager {
    rng: Box<dyn RngCore + Send>,
    lifetime: Duration,
    current: Option<PeerIdentity>,
    registered: bool,
    rotation_at: Option<Instant>,
    rotation_wall: Option<DateTime<Utc>>,
}

impl IdentityManager {
    pub fn new(rng: Box<dyn RngCore + Send>, lifetime: Duration) -> Self {
        Self {
            rng,
            lifetime,
            current: None,
            registered: false,
            rotation_at: None,
            rotation_wall: None,
        }
    }

    /// Draws a fresh code and replaces the current identity.
    ///
    /// The new identity is unregistered and has no rotation deadline until
    /// [`mark_registered`](Self::mark_registered) succeeds.
    pub fn issue(&mut self, now: Instant) -> PeerIdentity {
        let code = generate_code(&mut *self.rng);
        let identity = PeerIdentity {
            id: format!("{PEER_ID_PREFIX}{code}"),
            code,
            issued_at: now,
            expires_at: now + self.lifetime,
        };
        debug!(id = %identity.id, "issued identity");
        self.current = Some(identity.clone());
        self.registered = false;
        self.clear_rotation();
        identity
    }

    pub fn current(&self) -> Option<&PeerIdentity> {
        self.current.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.current.as_ref().map(|i| i.id.as_str())
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Records a successful registration of `id` and arms rotation at the
    /// identity's expiry. Registrations of stale identifiers are ignored.
    pub fn mark_registered(&mut self, id: &str, now: Instant) -> bool {
        let Some(expires_at) = self
            .current
            .as_ref()
            .filter(|i| i.id == id)
            .map(|i| i.expires_at)
        else {
            return false;
        };
        self.registered = true;
        self.arm_rotation(expires_at, now);
        true
    }

    /// Stops any pending rotation (a connection is being established).
    pub fn suspend_rotation(&mut self) {
        if self.rotation_at.is_some() {
            debug!("rotation suspended");
        }
        self.clear_rotation();
    }

    /// Re-arms rotation once a connection has ended.
    ///
    /// Fires at the identity's expiry, or shortly after `now` if it already
    /// expired.
    pub fn rearm_rotation(&mut self, now: Instant) {
        if !self.registered {
            return;
        }
        let at = self.current.as_ref().map(|i| {
            if i.is_expired(now) {
                now + ROTATION_SETTLE
            } else {
                i.expires_at
            }
        });
        if let Some(at) = at {
            self.arm_rotation(at, now);
        }
    }

    /// Monotonic instant of the next rotation check.
    pub fn rotation_at(&self) -> Option<Instant> {
        self.rotation_at
    }

    /// Wall-clock rotation deadline for display.
    pub fn rotation_deadline(&self) -> Option<DateTime<Utc>> {
        self.rotation_wall
    }

    /// Called when the rotation timer fires. Returns whether the identity
    /// should be replaced now.
    ///
    /// While a connection is being established or is live the check is a
    /// no-op and the deadline is dropped; it is re-armed when the connection
    /// ends.
    pub fn check_rotation(&mut self, state: ConnectionState) -> bool {
        self.clear_rotation();
        if state.is_engaged() {
            debug!(?state, "rotation skipped while engaged");
            return false;
        }
        info!(id = ?self.id(), "rotating identity");
        true
    }

    fn arm_rotation(&mut self, at: Instant, now: Instant) {
        self.rotation_at = Some(at);
        let remaining = at.saturating_duration_since(now);
        self.rotation_wall = chrono::Duration::from_std(remaining)
            .ok()
            .map(|d| Utc::now() + d);
    }

    fn clear_rotation(&mut self) {
        self.rotation_at = None;
        self.rotation_wall = None;
    }
}

/// Draws a uniformly random six-digit code (100000..=999999).
pub fn generate_code(rng: &mut dyn RngCore) -> String {
    let value: u32 = rng.gen_range(100_000..=999_999);
    format!("{value:0width$}", width = CODE_LENGTH)
}

/// Expands user input into a peer identifier.
///
/// Exactly six digits gain the namespace prefix; anything else is used as
/// typed (after trimming).
pub fn expand_target(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.len() == CODE_LENGTH && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        format!("{PEER_ID_PREFIX}{trimmed}")
    } else {
        trimmed.to_string()
    }
}
