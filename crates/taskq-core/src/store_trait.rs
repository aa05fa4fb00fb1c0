//! The store's repository contract.
//!
//! [`TaskQueueStore`] is the seam between the matching/priority logic in this crate and whatever
//! actually persists task queues — in this repository, `taskq-store`'s SQLite implementation.
//! Keeping the trait here (rather than in the store crate) lets [`crate::scheduler::Scheduler`]
//! depend only on an interface, never a concrete backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;
use crate::ids::{JobId, TqId};
use crate::matcher::TaskQueueDescriptor;
use crate::priority::RawPriority;
use crate::requirements::CanonicalRequirements;

/// Narrow error taxonomy surfaced by a [`TaskQueueStore`] implementation. The engine layer
/// (`crate::scheduler`) converts these into the crate-wide [`crate::error::Error`] at the public
/// API boundary via `#[from]`/explicit mapping, per the ambient error-handling design.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `attach_job` was called with a `job_id` already attached to some TQ.
    #[error("duplicate job: {0}")]
    DuplicateJob(JobId),
    /// No job row exists with this id.
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    /// No TQ row exists with this id.
    #[error("unknown task queue: {0}")]
    UnknownTaskQueue(TqId),
    /// `delete_tq` was called on a TQ that still has attached jobs.
    #[error("task queue {0} is not empty")]
    NotEmpty(TqId),
    /// Connection/lock-wait/I/O failure against the backing database.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for crate::error::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateJob(job_id) => {
                Self::conflict(format!("job {job_id} already attached"))
            }
            StoreError::UnknownJob(job_id) => Self::UnknownJob(job_id),
            StoreError::UnknownTaskQueue(tq_id) => Self::UnknownTaskQueue(tq_id),
            StoreError::NotEmpty(tq_id) => {
                Self::conflict(format!("task queue {tq_id} still has attached jobs"))
            }
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
        }
    }
}

/// Result alias for [`TaskQueueStore`] methods.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Repository interface over task-queue persistence.
///
/// Implementations must uphold the transactional guarantee of §4.2: `find_or_create_tq` either
/// commits the TQ scalar row and every multi-value row together, or leaves no trace of either.
#[async_trait]
pub trait TaskQueueStore: Send + Sync {
    /// Idempotent upsert on `fingerprint`. Holds a row-level lock on the scalar TQ row for the
    /// duration of multi-value row insertion so concurrent callers with the same fingerprint
    /// converge on one TQ rather than racing to create two. The returned `bool` is `true` only
    /// for the caller that actually created the row (never for one that found an existing TQ or
    /// lost the create race) — the engine layer uses it to decide whether this insert is the
    /// first TQ of its `OwnerGroup` and needs an incremental share recalculation.
    async fn find_or_create_tq(
        &self,
        canonical: &CanonicalRequirements,
        fingerprint: Fingerprint,
        initial_raw_priority: f64,
    ) -> StoreResult<(TqId, bool)>;

    /// Attach a job to a TQ. Fails [`StoreError::DuplicateJob`] if `job_id` is already attached
    /// anywhere.
    async fn attach_job(
        &self,
        tq_id: TqId,
        job_id: JobId,
        enqueued_at: DateTime<Utc>,
        priority_hint: f64,
    ) -> StoreResult<()>;

    /// Remove a job row, wherever it is attached, returning the TQ it was attached to. Fails
    /// [`StoreError::UnknownJob`] if the job does not exist.
    async fn detach_job(&self, job_id: JobId) -> StoreResult<TqId>;

    /// Atomically detach and return the oldest (by `enqueued_at`, tie-break ascending `job_id`)
    /// job attached to `tq_id`, or `None` if the TQ currently has none. Implementations use a
    /// row-level lock or `DELETE ... RETURNING` so concurrent callers never observe or dequeue
    /// the same job twice.
    async fn detach_oldest_job_in_tq(&self, tq_id: TqId) -> StoreResult<Option<JobId>>;

    /// Look up which TQ, if any, a job is currently attached to.
    async fn get_tq_for_job(&self, job_id: JobId) -> StoreResult<Option<TqId>>;

    /// Delete a TQ and cascade its multi-value rows. Fails [`StoreError::NotEmpty`] if any job
    /// is still attached. Returns the deleted TQ's `owner_group`, so the engine layer can trigger
    /// an incremental share recalculation for that group.
    async fn delete_tq(&self, tq_id: TqId) -> StoreResult<String>;

    /// Delete a TQ only if it currently has no attached jobs. Returns the deleted TQ's
    /// `owner_group` if the delete happened, `None` if the TQ was non-empty or did not exist;
    /// never errors on non-emptiness (that's the whole point of the "safe variant").
    async fn delete_tq_if_empty(&self, tq_id: TqId) -> StoreResult<Option<String>>;

    /// Enumerate every TQ with its scalar and multi-value content, current share, and job count.
    async fn retrieve_tqs(&self) -> StoreResult<Vec<TaskQueueDescriptor>>;

    /// Count currently-live TQs.
    async fn get_num_task_queues(&self) -> StoreResult<i64>;

    /// Delete TQs with zero attached jobs under a `NOT EXISTS (job)` guard so this never races
    /// an in-progress `insert_job`/`attach_job`. Returns the number of TQs removed.
    async fn clean_orphaned_task_queues(&self) -> StoreResult<u64>;

    /// Jobs whose TQ vanished — should be unreachable under correct operation, but surfaced for
    /// operator inspection rather than silently dropped.
    async fn find_orphan_jobs(&self) -> StoreResult<Vec<JobId>>;

    /// Remove expired delegation request rows from the companion credential table the scheduler
    /// shares its backing store with. Returns the number of rows purged.
    async fn purge_expired_requests(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Remove expired, non-persistent proxy rows from the companion credential table. Persistent
    /// proxies are kept regardless of expiry — the credential lifecycle owns their renewal.
    /// Returns the number of rows purged.
    async fn purge_expired_proxies(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Gather every TQ's raw priority input, grouped by `owner_group`, for the priority engine
    /// to normalise.
    async fn raw_priorities_by_group(&self) -> StoreResult<BTreeMap<String, Vec<RawPriority>>>;

    /// Persist recomputed shares. Implementations should do this as a single batch write.
    async fn update_shares(&self, shares: &HashMap<TqId, f64>) -> StoreResult<()>;
}
