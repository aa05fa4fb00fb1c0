//! Crate-wide error taxonomy.
//!
//! Every public scheduler operation returns [`Result<T>`], whose error variants map 1:1 onto
//! the error kinds the design calls out: malformed input, lookup failures, invariant conflicts,
//! transient store failures, deadlines, and internal invariant violations. `NoMatch` is not an
//! error — it is represented by [`crate::matcher::MatchOutcome::NoMatch`].

use crate::ids::{JobId, TqId};

/// Errors surfaced by the scheduler's public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed requirements or resource description. Caller bug; do not retry.
    #[error("bad request: field '{field}': {message}")]
    BadRequest {
        /// Name of the offending field.
        field: String,
        /// Human-readable diagnostic.
        message: String,
    },

    /// No job exists with the given id.
    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    /// No task queue exists with the given id.
    #[error("unknown task queue: {0}")]
    UnknownTaskQueue(TqId),

    /// Operation would violate a schema invariant (duplicate job, delete of non-empty TQ).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient I/O or lock-wait failure against the backing store. Caller may retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The operation's deadline elapsed before it completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// An invariant the scheduler relies on was violated. Fatal to the operation, not the
    /// process; always worth logging loudly.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl Error {
    /// Construct a [`Error::BadRequest`] naming the offending field.
    #[must_use]
    pub fn bad_request(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Construct a [`Error::Conflict`].
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Construct a [`Error::Internal`].
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// True for error kinds the spec says a caller may retry after backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Result alias used throughout the scheduler's public API.
pub type Result<T> = std::result::Result<T, Error>;
