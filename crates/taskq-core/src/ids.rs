//! Opaque identifier newtypes.
//!
//! Job and task-queue ids are surrogate integers assigned by the store. Wrapping them prevents
//! accidentally passing a `job_id` where a `tq_id` is expected.

use serde::{Deserialize, Serialize};

/// Opaque, globally unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl JobId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Unwrap to the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque task-queue identifier. Identity of the TQ itself is its requirement fingerprint; this
/// id is a surrogate key used everywhere else for efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TqId(pub i64);

impl TqId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Unwrap to the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TqId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
