use chrono::{DateTime, Utc};

use crate::TransferError;
use crate::source::FileSource;

/// Combines several files into one archive before an offer.
///
/// Only one logical file is ever streamed per transfer, so multi-file offers
/// go through a bundler first.
pub trait Bundler: Send {
    /// Packs `files` into a single source named `name`.
    fn bundle(
        &mut self,
        files: Vec<Box<dyn FileSource>>,
        name: &str,
    ) -> Result<Box<dyn FileSource>, TransferError>;
}

/// Archive name for a bundle created at `at`,
/// e.g. `SendOver_Bundle_2026-03-14-09-26-53.zip`.
pub fn bundle_name(at: DateTime<Utc>) -> String {
    format!("SendOver_Bundle_{}.zip", at.format("%Y-%m-%d-%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bundle_name_uses_dashed_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(bundle_name(at), "SendOver_Bundle_2026-03-14-09-26-53.zip");
    }

    #[test]
    fn bundle_name_is_a_valid_file_name() {
        assert!(crate::validate_file_name(&bundle_name(Utc::now())).is_ok());
    }
}
