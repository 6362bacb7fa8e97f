//! Error types shared across purse crates.
//!
//! Only [`ParseError`] and [`PersistenceError`] are meant to reach the user.
//! Everything that goes wrong while talking to the AI service is absorbed
//! further down and never shows up here.

use thiserror::Error;

/// The user's text did not contain anything that looks like a transaction.
///
/// Never retried: the same text will fail the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The message was empty or whitespace only.
    #[error("message is empty")]
    Empty,

    /// The message is longer than the extractor accepts.
    #[error("message too long: {len} chars (max {max})")]
    TooLong {
        /// Length of the rejected message in chars.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No fragment of the message contained a non-zero amount.
    #[error("no amount found in message")]
    NoAmount,
}

/// Saving confirmed transactions failed.
///
/// Surfaced to the user as a retryable save failure; re-confirming the
/// batch is always safe.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The backing store could not be written.
    #[error("store write failed: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be serialized.
    #[error("row serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level error type for purse.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PurseError {
    /// Text extraction failed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Persisting a confirmed batch failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PurseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        assert_eq!(ParseError::Empty.to_string(), "message is empty");
        assert_eq!(ParseError::NoAmount.to_string(), "no amount found in message");
        assert_eq!(
            ParseError::TooLong { len: 5000, max: 4096 }.to_string(),
            "message too long: 5000 chars (max 4096)"
        );
    }

    #[test]
    fn persistence_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PersistenceError = io_err.into();
        assert!(matches!(err, PersistenceError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn purse_error_wraps_parse() {
        let err: PurseError = ParseError::NoAmount.into();
        assert!(matches!(err, PurseError::Parse(ParseError::NoAmount)));
        assert_eq!(err.to_string(), "parse error: no amount found in message");
    }

    #[test]
    fn purse_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: PurseError = json_err.into();
        assert!(matches!(err, PurseError::Json(_)));
    }

    #[test]
    fn config_invalid_display() {
        let err = PurseError::ConfigInvalid {
            reason: "burst must be > 0".into(),
        };
        assert_eq!(err.to_string(), "invalid config: burst must be > 0");
    }
}
