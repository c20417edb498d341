//! Error types for socket table monitoring.

use std::io;

/// Result type for socket table monitoring operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while monitoring kernel socket tables.
///
/// Only failures to open or read the table file abort a poll cycle.
/// Malformed table rows are skipped during parsing and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error opening or reading the socket table file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A table field could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Check if this is a "not found" error (the table file is absent).
    ///
    /// A missing table usually means the protocol module is not loaded or
    /// the path points outside a mounted procfs; callers typically retry on
    /// their next scheduled poll.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    /// Check if this is a permission error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        let err = Error::from(io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_is_permission_denied() {
        let err = Error::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_parse_message() {
        let err = Error::Parse("malformed address column: xyz".into());
        assert_eq!(err.to_string(), "parse error: malformed address column: xyz");
        assert!(!err.is_not_found());
    }
}
