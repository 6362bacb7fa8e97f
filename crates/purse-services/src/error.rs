//! Error types for purse services.

use purse_types::error::PersistenceError;
use thiserror::Error;

/// Errors that can occur in service operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A store write failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Convenience alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ServiceError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.to_string(), "io error: gone");

        let err = ServiceError::from(PersistenceError::Io(std::io::Error::other("disk full")));
        assert_eq!(err.to_string(), "store write failed: disk full");
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ServiceError = json_err.into();
        assert!(err.to_string().starts_with("json error:"));
    }
}
