//! Transient notices shown to the user.
//!
//! Every notice expires on its own; the session driver wakes up at
//! [`NoticeQueue::next_expiry`] and calls [`NoticeQueue::expire`].

use std::time::Duration;

use tokio::time::Instant;

/// Default notice display duration.
const DEFAULT_DURATION: Duration = Duration::from_millis(4000);

/// Error notice display duration (longer for visibility).
const ERROR_DURATION: Duration = Duration::from_millis(6000);

/// The visual category of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    pub duration: Duration,
    pub expires_at: Instant,
}

/// Notice queue with monotonic ID assignment and timed expiry.
#[derive(Debug, Clone, Default)]
pub struct NoticeQueue {
    notices: Vec<Notice>,
    next_id: u64,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a notice with explicit kind and duration. Returns its ID.
    pub fn push(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        duration: Duration,
        now: Instant,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.notices.push(Notice {
            id,
            kind,
            message: message.into(),
            duration,
            expires_at: now + duration,
        });
        id
    }

    pub fn success(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.push(NoticeKind::Success, message, DEFAULT_DURATION, now)
    }

    pub fn error(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.push(NoticeKind::Error, message, ERROR_DURATION, now)
    }

    pub fn warning(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.push(NoticeKind::Warning, message, DEFAULT_DURATION, now)
    }

    pub fn info(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.push(NoticeKind::Info, message, DEFAULT_DURATION, now)
    }

    /// Remove a notice by ID. Returns `true` if found and removed.
    pub fn remove(&mut self, id: u64) -> bool {
        let len_before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != len_before
    }

    /// Drops every notice whose deadline has passed. Returns how many.
    pub fn expire(&mut self, now: Instant) -> usize {
        let len_before = self.notices.len();
        self.notices.retain(|n| n.expires_at > now);
        len_before - self.notices.len()
    }

    /// Earliest pending expiry.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.notices.iter().map(|n| n.expires_at).min()
    }

    pub fn get(&self, id: u64) -> Option<&Notice> {
        self.notices.iter().find(|n| n.id == id)
    }

    /// Notices in insertion order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ids_are_monotonic_and_ordered() {
        let now = Instant::now();
        let mut q = NoticeQueue::new();
        let a = q.success("first", now);
        let b = q.error("second", now);
        let c = q.info("third", now);
        assert_eq!((a, b, c), (0, 1, 2));

        let messages: Vec<&str> = q.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn error_notices_last_longer() {
        let now = Instant::now();
        let mut q = NoticeQueue::new();
        let s = q.success("ok", now);
        let e = q.error("fail", now);
        let w = q.warning("hmm", now);

        assert_eq!(q.get(s).unwrap().duration, Duration::from_secs(4));
        assert_eq!(q.get(e).unwrap().duration, Duration::from_secs(6));
        assert_eq!(q.get(w).unwrap().kind, NoticeKind::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_drops_only_due_notices() {
        let now = Instant::now();
        let mut q = NoticeQueue::new();
        q.info("short", now);
        let long = q.error("long", now);
        assert_eq!(q.next_expiry(), Some(now + Duration::from_secs(4)));

        assert_eq!(q.expire(now + Duration::from_secs(4)), 1);
        assert_eq!(q.len(), 1);
        assert!(q.get(long).is_some());
        assert_eq!(q.next_expiry(), Some(now + Duration::from_secs(6)));

        assert_eq!(q.expire(now + Duration::from_secs(6)), 1);
        assert!(q.is_empty());
        assert!(q.next_expiry().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_by_id() {
        let now = Instant::now();
        let mut q = NoticeQueue::new();
        let keep = q.success("keep", now);
        let gone = q.warning("gone", now);

        assert!(q.remove(gone));
        assert!(!q.remove(gone));
        assert!(q.get(keep).is_some());
    }
}
