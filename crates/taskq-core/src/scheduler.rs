//! Public API facade.
//!
//! [`Scheduler`] is the single entry point callers use: it owns a [`SchedulerConfig`], a
//! [`PlatformOrder`] built from it, and a [`TaskQueueStore`] implementation, and wires them
//! together into the operations of the external interface — `insert_job`, `match_and_get_job`,
//! housekeeping, and the priority engine. It never exposes `StoreError` or any other
//! backend-specific type; every method returns [`crate::error::Result`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::ids::{JobId, TqId};
use crate::matcher::{self, ResourceDescription, TaskQueueDescriptor};
use crate::platform::PlatformOrder;
use crate::priority::{normalise_group_shares, RawPriority};
use crate::requirements::{normalise, Requirements};
use crate::store_trait::TaskQueueStore;

/// Outcome of [`Scheduler::match_and_get_job`]. `NoMatch` is a normal result, not an error — see
/// §7 of the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A job was found, dispatched (atomically detached), and is returned to the caller.
    Matched {
        /// The TQ it was dispatched from.
        tq_id: TqId,
        /// The dispatched job.
        job_id: JobId,
    },
    /// No candidate TQ (or no attached job within an otherwise-matching TQ) was found.
    NoMatch,
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .unwrap_or(Err(Error::DeadlineExceeded)),
        None => fut.await,
    }
}

/// Ties the matching algebra, priority engine, and store together behind the operations external
/// callers use.
pub struct Scheduler<S: TaskQueueStore> {
    store: Arc<S>,
    config: crate::config::SchedulerConfig,
    platform_order: PlatformOrder,
}

impl<S: TaskQueueStore> Scheduler<S> {
    /// Build a scheduler over `store`, compiling `config`'s platform edges into a
    /// [`PlatformOrder`] once up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] if `config.platform_order` contains a cycle.
    pub fn new(store: Arc<S>, config: crate::config::SchedulerConfig) -> Result<Self> {
        let platform_order = PlatformOrder::build(&config.platform_order)?;
        Ok(Self {
            store,
            config,
            platform_order,
        })
    }

    /// The resolved configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &crate::config::SchedulerConfig {
        &self.config
    }

    /// Validate, normalise, fingerprint, and attach `reqs` as `job_id`'s requirements, creating
    /// or reusing the matching TQ.
    #[instrument(skip(self, reqs), fields(job_id = %job_id))]
    pub async fn insert_job(
        &self,
        job_id: JobId,
        reqs: &Requirements,
        priority: f64,
        deadline: Option<Duration>,
    ) -> Result<()> {
        with_deadline(deadline, async {
            let canonical = normalise(reqs, &self.config.cpu_time_buckets)?;
            let fp = fingerprint(&canonical);
            let (tq_id, created) = self
                .store
                .find_or_create_tq(&canonical, fp, priority.max(0.0))
                .await?;
            self.store
                .attach_job(tq_id, job_id, Utc::now(), priority)
                .await?;
            debug!(%tq_id, "job attached");
            if created {
                // First TQ of this OwnerGroup: give it a share before the next periodic
                // recalculateTQSharesForAll rather than leaving it at share=0 until then.
                self.recalculate_shares_for_group_inner(&canonical.owner_group)
                    .await?;
            }
            Ok(())
        })
        .await
    }

    /// Detach `job_id` from wherever it is attached. Idempotent: a job already gone is not an
    /// error.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn delete_job(&self, job_id: JobId, deadline: Option<Duration>) -> Result<()> {
        with_deadline(deadline, async {
            match self.store.detach_job(job_id).await {
                Ok(tq_id) => {
                    debug!(%tq_id, "job detached");
                    Ok(())
                }
                Err(crate::store_trait::StoreError::UnknownJob(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Resolve which TQ, if any, each of `job_ids` currently belongs to. Jobs with no current
    /// attachment are simply absent from the returned map.
    #[instrument(skip(self, job_ids))]
    pub async fn get_task_queue_for_jobs(
        &self,
        job_ids: &[JobId],
        deadline: Option<Duration>,
    ) -> Result<HashMap<JobId, TqId>> {
        with_deadline(deadline, async {
            let mut out = HashMap::with_capacity(job_ids.len());
            for &job_id in job_ids {
                if let Some(tq_id) = self.store.get_tq_for_job(job_id).await? {
                    out.insert(job_id, tq_id);
                }
            }
            Ok(out)
        })
        .await
    }

    /// Enumerate every live TQ, keyed by id.
    #[instrument(skip(self))]
    pub async fn retrieve_task_queues(
        &self,
        deadline: Option<Duration>,
    ) -> Result<HashMap<TqId, TaskQueueDescriptor>> {
        with_deadline(deadline, async {
            let tqs = self.store.retrieve_tqs().await?;
            Ok(tqs.into_iter().map(|tq| (tq.tq_id, tq)).collect())
        })
        .await
    }

    /// Delete a TQ outright. Fails [`Error::Conflict`] if any job is still attached.
    #[instrument(skip(self), fields(tq_id = %tq_id))]
    pub async fn delete_task_queue(&self, tq_id: TqId, deadline: Option<Duration>) -> Result<()> {
        with_deadline(deadline, async {
            let owner_group = self.store.delete_tq(tq_id).await?;
            // Last TQ of a group deleted: recompute so the group's (now possibly empty) share
            // set never lingers stale. Harmless no-op if other TQs remain in the group.
            self.recalculate_shares_for_group_inner(&owner_group).await?;
            Ok(())
        })
        .await
    }

    /// Delete a TQ only if currently empty. Returns whether it was deleted; never errors on
    /// non-emptiness.
    #[instrument(skip(self), fields(tq_id = %tq_id))]
    pub async fn delete_task_queue_if_empty(
        &self,
        tq_id: TqId,
        deadline: Option<Duration>,
    ) -> Result<bool> {
        with_deadline(deadline, async {
            match self.store.delete_tq_if_empty(tq_id).await? {
                Some(owner_group) => {
                    self.recalculate_shares_for_group_inner(&owner_group).await?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    /// Count currently-live TQs.
    #[instrument(skip(self))]
    pub async fn get_num_task_queues(&self, deadline: Option<Duration>) -> Result<i64> {
        with_deadline(deadline, async { Ok(self.store.get_num_task_queues().await?) }).await
    }

    /// Rank TQs compatible with `resources`, without dequeuing any job. Used for diagnostics and
    /// pilot pre-filtering.
    #[instrument(skip(self, resources))]
    pub async fn match_and_get_task_queue(
        &self,
        resources: &ResourceDescription,
        deadline: Option<Duration>,
    ) -> Result<Vec<TqId>> {
        with_deadline(deadline, async {
            let tqs = self.store.retrieve_tqs().await?;
            let candidates = matcher::select_candidates(&self.platform_order, resources, &tqs)?;
            Ok(candidates.into_iter().map(|tq| tq.tq_id).collect())
        })
        .await
    }

    /// Compile `resources`, pick a compatible TQ by weighted-random selection over share, and
    /// atomically dequeue its oldest job. Retries up to `match_retry_budget` times if the
    /// detach race loses to a concurrent matcher, returning [`MatchOutcome::NoMatch`] only after
    /// the candidate list is genuinely empty or the retry budget is exhausted.
    #[instrument(skip(self, resources))]
    pub async fn match_and_get_job(
        &self,
        resources: &ResourceDescription,
        deadline: Option<Duration>,
    ) -> Result<MatchOutcome> {
        with_deadline(deadline, async {
            let mut rng = rand::thread_rng();
            for attempt in 0..=self.config.match_retry_budget {
                let tqs = self.store.retrieve_tqs().await?;
                let candidates =
                    matcher::select_candidates(&self.platform_order, resources, &tqs)?;
                let Some(chosen) = matcher::pick_weighted(&candidates, &mut rng) else {
                    return Ok(MatchOutcome::NoMatch);
                };
                match self.store.detach_oldest_job_in_tq(chosen.tq_id).await? {
                    Some(job_id) => {
                        debug!(tq_id = %chosen.tq_id, %job_id, "dispatched");
                        return Ok(MatchOutcome::Matched {
                            tq_id: chosen.tq_id,
                            job_id,
                        });
                    }
                    None => {
                        warn!(tq_id = %chosen.tq_id, attempt, "detach race lost, retrying");
                    }
                }
            }
            Ok(MatchOutcome::NoMatch)
        })
        .await
    }

    /// Delete TQs with zero attached jobs.
    #[instrument(skip(self))]
    pub async fn clean_orphaned_task_queues(&self, deadline: Option<Duration>) -> Result<u64> {
        with_deadline(deadline, async {
            Ok(self.store.clean_orphaned_task_queues().await?)
        })
        .await
    }

    /// Jobs whose TQ vanished — should be unreachable, surfaced for operator inspection.
    #[instrument(skip(self))]
    pub async fn find_orphan_jobs(&self, deadline: Option<Duration>) -> Result<Vec<JobId>> {
        with_deadline(deadline, async { Ok(self.store.find_orphan_jobs().await?) }).await
    }

    /// Remove expired delegation request rows from the companion credential tables.
    #[instrument(skip(self))]
    pub async fn purge_expired_requests(&self, deadline: Option<Duration>) -> Result<u64> {
        with_deadline(deadline, async {
            Ok(self.store.purge_expired_requests(Utc::now()).await?)
        })
        .await
    }

    /// Remove expired, non-persistent proxy rows from the companion credential tables.
    #[instrument(skip(self))]
    pub async fn purge_expired_proxies(&self, deadline: Option<Duration>) -> Result<u64> {
        with_deadline(deadline, async {
            Ok(self.store.purge_expired_proxies(Utc::now()).await?)
        })
        .await
    }

    /// Recompute normalised shares for every `OwnerGroup` currently known to the store.
    #[instrument(skip(self))]
    pub async fn recalculate_tq_shares_for_all(&self, deadline: Option<Duration>) -> Result<()> {
        with_deadline(deadline, async {
            let by_group = self.store.raw_priorities_by_group().await?;
            let mut all_shares = HashMap::new();
            for raw in by_group.values() {
                all_shares.extend(normalise_group_shares(raw));
            }
            self.store.update_shares(&all_shares).await?;
            Ok(())
        })
        .await
    }

    /// Recompute normalised shares for a single `OwnerGroup`. Called implicitly on first insert
    /// into a previously empty group and after the last TQ in a group is deleted.
    #[instrument(skip(self))]
    pub async fn recalculate_tq_shares_for_group(
        &self,
        group: &str,
        deadline: Option<Duration>,
    ) -> Result<()> {
        with_deadline(deadline, self.recalculate_shares_for_group_inner(group)).await
    }

    /// Shared by the public `recalculate_tq_shares_for_group` and the implicit hooks
    /// `insert_job`/`delete_task_queue[_if_empty]` call on group-membership transitions.
    /// Deadline-agnostic so it composes under the caller's own `with_deadline` wrapper.
    async fn recalculate_shares_for_group_inner(&self, group: &str) -> Result<()> {
        let by_group = self.store.raw_priorities_by_group().await?;
        let raw: &[RawPriority] = by_group.get(group).map_or(&[], Vec::as_slice);
        let shares = normalise_group_shares(raw);
        self.store.update_shares(&shares).await?;
        Ok(())
    }
}
