use serde::{Deserialize, Serialize};

/// State of the single peer connection owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Whether a connection is being established or is live.
    ///
    /// Identity rotation is suspended while this holds.
    pub fn is_engaged(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Which side of the transfer this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferRole {
    #[default]
    Sender,
    Receiver,
}

/// Lifecycle of the active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    #[default]
    Idle,
    Incoming,
    Waiting,
    Transferring,
    Completed,
    Error,
}

impl TransferStatus {
    /// Whether a header has been exchanged and the transfer has not ended.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransferStatus::Incoming | TransferStatus::Waiting | TransferStatus::Transferring
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Error)
    }
}

/// Snapshot of the active transfer for presentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub role: TransferRole,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_id: String,
    pub file_name: String,
    pub total_size: u64,
    pub transferred_size: u64,
    pub percentage: f64,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "errorMsg")]
    pub error_message: Option<String>,
}

impl TransferProgress {
    /// A fresh transfer that has just been announced.
    pub fn new(
        role: TransferRole,
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        total_size: u64,
        status: TransferStatus,
    ) -> Self {
        Self {
            role,
            file_id: file_id.into(),
            file_name: file_name.into(),
            total_size,
            transferred_size: 0,
            percentage: 0.0,
            status,
            speed: None,
            error_message: None,
        }
    }

    /// Records `transferred` bytes, keeping the counter monotonic and bounded.
    pub fn advance_to(&mut self, transferred: u64) {
        let bounded = transferred.min(self.total_size);
        if bounded > self.transferred_size {
            self.transferred_size = bounded;
        }
        self.percentage = percentage(self.transferred_size, self.total_size);
    }

    /// Marks the transfer complete with every byte accounted for.
    pub fn complete(&mut self) {
        self.transferred_size = self.total_size;
        self.percentage = 100.0;
        self.status = TransferStatus::Completed;
        self.speed = None;
    }

    /// Marks the transfer failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TransferStatus::Error;
        self.error_message = Some(message.into());
        self.speed = None;
    }
}

/// Progress as a percentage (0-100). An empty file counts as fully sent.
pub fn percentage(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    transferred as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_progress_is_default() {
        let p = TransferProgress::default();
        assert_eq!(p.status, TransferStatus::Idle);
        assert_eq!(p.role, TransferRole::Sender);
        assert_eq!(p.transferred_size, 0);
    }

    #[test]
    fn advance_is_monotonic_and_bounded() {
        let mut p = TransferProgress::new(
            TransferRole::Receiver,
            "f",
            "a.bin",
            1000,
            TransferStatus::Transferring,
        );
        p.advance_to(500);
        assert!((p.percentage - 50.0).abs() < f64::EPSILON);
        p.advance_to(400);
        assert_eq!(p.transferred_size, 500);
        p.advance_to(5000);
        assert_eq!(p.transferred_size, 1000);
    }

    #[test]
    fn complete_sets_exact_total() {
        let mut p =
            TransferProgress::new(TransferRole::Sender, "f", "a.bin", 42, TransferStatus::Waiting);
        p.complete();
        assert_eq!(p.transferred_size, 42);
        assert_eq!(p.status, TransferStatus::Completed);
        assert!((p.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn status_serialization_matches_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Transferring).unwrap(),
            "\"TRANSFERRING\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            "\"DISCONNECTED\""
        );
    }

    #[test]
    fn progress_omits_empty_optionals() {
        let json = serde_json::to_string(&TransferProgress::default()).unwrap();
        assert!(!json.contains("errorMsg"));
        assert!(!json.contains("speed"));
        assert!(!json.contains("fileId"));
    }

    #[test]
    fn engaged_states_suspend_rotation() {
        assert!(ConnectionState::Connecting.is_engaged());
        assert!(ConnectionState::Connected.is_engaged());
        assert!(!ConnectionState::Disconnected.is_engaged());
        assert!(!ConnectionState::Error.is_engaged());
    }

    #[test]
    fn zero_size_counts_as_complete() {
        assert!((percentage(0, 0) - 100.0).abs() < f64::EPSILON);
    }
}
