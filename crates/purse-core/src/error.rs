//! Error types for the purse core.
//!
//! [`CategorizeError`] never leaves the crate as an error: the categorizer
//! folds it into [`AiOutcome::Unavailable`](crate::categorizer::AiOutcome)
//! and the pipeline falls back to keyword classification. [`PipelineError`]
//! is what callers of [`TransactionPipeline`](crate::pipeline::TransactionPipeline)
//! see.

use std::time::Duration;

use purse_types::ParseError;
use thiserror::Error;

/// Why the AI categorization service could not be used for a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategorizeError {
    /// No token became available within the acquire timeout.
    #[error("rate limit exceeded for '{dependency}' (waited up to {waited:?})")]
    RateLimitExceeded {
        /// Dependency name.
        dependency: String,
        /// Configured wait budget.
        waited: Duration,
    },

    /// The circuit is open (or a half-open probe is already in flight).
    #[error("circuit open for '{dependency}'")]
    CircuitOpen {
        /// Dependency name.
        dependency: String,
    },

    /// Every retry attempt failed with a transient error.
    #[error("retries exhausted for '{dependency}' after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Dependency name.
        dependency: String,
        /// Attempts made.
        attempts: u32,
        /// Last error, rendered.
        last: String,
    },

    /// The service rejected the call in a way retries cannot fix.
    #[error("terminal service error from '{dependency}': {reason}")]
    TerminalService {
        /// Dependency name.
        dependency: String,
        /// Error, rendered.
        reason: String,
    },
}

/// Errors surfaced by the pipeline to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The text contained nothing that looks like a transaction.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The user is not on the allowlist.
    #[error("user {user_id} is not allowed to use this assistant")]
    Unauthorized {
        /// Rejected user.
        user_id: i64,
    },

    /// The user sent too many messages in the current window.
    #[error("too many messages from user {user_id}, try again shortly")]
    Throttled {
        /// Throttled user.
        user_id: i64,
    },

    /// The caller abandoned the request before results were ready.
    #[error("request cancelled")]
    Cancelled,

    /// A confirmation edit was rejected.
    #[error("invalid edit: {reason}")]
    InvalidEdit {
        /// What was wrong with the edit.
        reason: String,
    },
}

impl PipelineError {
    /// Whether this error should be shown to the end user verbatim.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_is_transparent() {
        let err: PipelineError = ParseError::NoAmount.into();
        assert_eq!(err.to_string(), "no amount found in message");
        assert!(err.is_user_facing());
    }

    #[test]
    fn cancelled_is_not_user_facing() {
        assert!(!PipelineError::Cancelled.is_user_facing());
    }

    #[test]
    fn categorize_error_display() {
        let err = CategorizeError::CircuitOpen {
            dependency: "ai-categorizer".into(),
        };
        assert_eq!(err.to_string(), "circuit open for 'ai-categorizer'");
    }
}
