use std::path::{Component, Path};

use crate::TransferError;

/// Validates a file name announced by a peer before it touches the disk.
///
/// The name must be a single plain path component. Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent or current directory references (`..`, `.`)
/// - Anything with a directory separator
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::RootDir | Component::Prefix(_)), _) => {
            return Err(TransferError::InvalidName(format!(
                "absolute path not allowed: {name}"
            )));
        }
        (Some(Component::ParentDir), _) => {
            return Err(TransferError::InvalidName(format!(
                "parent directory traversal not allowed: {name}"
            )));
        }
        _ => {
            return Err(TransferError::InvalidName(format!(
                "name must be a single path component: {name}"
            )));
        }
    }

    // `Path` on Unix treats backslash as a regular character.
    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "name must be a single path component: {name}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("   ").is_err());
    }

    #[test]
    fn rejects_parent_dir() {
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_file_name("/tmp/evil").is_err());
    }

    #[test]
    fn rejects_nested_path() {
        assert!(validate_file_name("sub/file.txt").is_err());
        assert!(validate_file_name("sub\\file.txt").is_err());
    }

    #[test]
    fn rejects_current_dir() {
        assert!(validate_file_name(".").is_err());
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
        assert!(validate_file_name("SendOver_Bundle_2026-01-02-03-04-05.zip").is_ok());
    }
}
