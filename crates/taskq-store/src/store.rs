//! [`SqliteStore`]: the concrete [`TaskQueueStore`] implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::DatabaseError;
use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

use taskq_core::fingerprint::Fingerprint;
use taskq_core::ids::{JobId, TqId};
use taskq_core::matcher::TaskQueueDescriptor;
use taskq_core::priority::RawPriority;
use taskq_core::requirements::CanonicalRequirements;
use taskq_core::store_trait::{StoreError, StoreResult, TaskQueueStore};

use crate::map_err;
use crate::schema;

/// `SQLite`-backed [`TaskQueueStore`].
///
/// Cheap to clone (an `sqlx::SqlitePool` is itself a handle around a connection pool), so callers
/// typically wrap it in an `Arc` once and share it across every `Scheduler` consumer.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `database_url` — e.g. `sqlite://taskq.db?mode=rwc`
    /// or `sqlite::memory:` — bound to a pool of at most `max_connections`, and run the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection or schema initialisation fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = schema::create_connection_pool(database_url, max_connections).await?;
        schema::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-configured pool (schema must already be initialised — used by tests that
    /// want a single-connection in-memory pool shared across several `SqliteStore`s).
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool, for callers that need to run diagnostics queries the
    /// trait does not expose.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_tq_by_fingerprint(&self, fingerprint_hex: &str) -> StoreResult<Option<TqId>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT tq_id FROM tq_task_queues WHERE fingerprint = ?1")
                .bind(fingerprint_hex)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(row.map(|(id,)| TqId::new(id)))
    }
}

/// The canonical multi-value field columns, paired with the set each carries. Order matches
/// [`taskq_core::requirements::MULTI_VALUE_FIELDS`].
fn multi_value_fields(canonical: &CanonicalRequirements) -> [(&'static str, &BTreeSet<String>); 9] {
    [
        ("Sites", &canonical.sites),
        ("BannedSites", &canonical.banned_sites),
        ("GridCEs", &canonical.grid_ces),
        ("JobTypes", &canonical.job_types),
        ("SubmitPools", &canonical.submit_pools),
        ("PilotTypes", &canonical.pilot_types),
        ("Platforms", &canonical.platforms),
        ("Tags", &canonical.tags),
        ("RequiredTags", &canonical.required_tags),
    ]
}

#[async_trait]
impl TaskQueueStore for SqliteStore {
    #[instrument(skip(self, canonical, initial_raw_priority), fields(fingerprint = %fingerprint))]
    async fn find_or_create_tq(
        &self,
        canonical: &CanonicalRequirements,
        fingerprint: Fingerprint,
        initial_raw_priority: f64,
    ) -> StoreResult<(TqId, bool)> {
        let fingerprint_hex = fingerprint.to_hex();

        if let Some(tq_id) = self.find_tq_by_fingerprint(&fingerprint_hex).await? {
            return Ok((tq_id, false));
        }

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let insert_result = sqlx::query(
            "INSERT INTO tq_task_queues (fingerprint, owner_dn, owner_group, setup, cpu_time, priority, share)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        )
        .bind(&fingerprint_hex)
        .bind(&canonical.owner_dn)
        .bind(&canonical.owner_group)
        .bind(&canonical.setup)
        .bind(canonical.cpu_time)
        .bind(initial_raw_priority.max(0.0))
        .execute(&mut *tx)
        .await;

        // Two concurrent callers can both pass the find-by-fingerprint check above before either
        // commits; SQLite's single-writer lock serialises them, and the loser sees a unique
        // violation here. Rather than propagate it, fall back to reading the winner's row —
        // that's the "both wait and use it" half of the find_or_create_tq contract.
        let tq_id = match insert_result {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                drop(tx);
                debug!("lost the create race on this fingerprint, reading the winner's row");
                let tq_id = self
                    .find_tq_by_fingerprint(&fingerprint_hex)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Unavailable(
                            "unique violation on insert but fingerprint now absent".to_string(),
                        )
                    })?;
                return Ok((tq_id, false));
            }
            Err(e) => return Err(map_err(e)),
        };

        for (field, values) in multi_value_fields(canonical) {
            for value in values {
                sqlx::query("INSERT INTO tq_multi_values (tq_id, field, value) VALUES (?1, ?2, ?3)")
                    .bind(tq_id)
                    .bind(field)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
            }
        }

        tx.commit().await.map_err(map_err)?;
        Ok((TqId::new(tq_id), true))
    }

    #[instrument(skip(self, priority_hint), fields(%tq_id, %job_id))]
    async fn attach_job(
        &self,
        tq_id: TqId,
        job_id: JobId,
        enqueued_at: DateTime<Utc>,
        priority_hint: f64,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO tq_jobs (job_id, tq_id, enqueued_at, priority_hint) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(job_id.get())
        .bind(tq_id.get())
        .bind(enqueued_at.to_rfc3339())
        .bind(priority_hint)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateJob(job_id))
            }
            Err(e) => Err(map_err(e)),
        }
    }

    #[instrument(skip(self), fields(%job_id))]
    async fn detach_job(&self, job_id: JobId) -> StoreResult<TqId> {
        let row: Option<(i64,)> =
            sqlx::query_as("DELETE FROM tq_jobs WHERE job_id = ?1 RETURNING tq_id")
                .bind(job_id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;

        row.map(|(tq_id,)| TqId::new(tq_id))
            .ok_or(StoreError::UnknownJob(job_id))
    }

    #[instrument(skip(self), fields(%tq_id))]
    async fn detach_oldest_job_in_tq(&self, tq_id: TqId) -> StoreResult<Option<JobId>> {
        // The subquery + DELETE run as one statement under SQLite's single-writer lock, so this
        // is atomic: no two callers can ever select and delete the same oldest row.
        let row: Option<(i64,)> = sqlx::query_as(
            "DELETE FROM tq_jobs
             WHERE job_id = (
                 SELECT job_id FROM tq_jobs
                 WHERE tq_id = ?1
                 ORDER BY enqueued_at ASC, job_id ASC
                 LIMIT 1
             )
             RETURNING job_id",
        )
        .bind(tq_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(row.map(|(job_id,)| JobId::new(job_id)))
    }

    async fn get_tq_for_job(&self, job_id: JobId) -> StoreResult<Option<TqId>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT tq_id FROM tq_jobs WHERE job_id = ?1")
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|(tq_id,)| TqId::new(tq_id)))
    }

    #[instrument(skip(self), fields(%tq_id))]
    async fn delete_tq(&self, tq_id: TqId) -> StoreResult<String> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let (attached,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tq_jobs WHERE tq_id = ?1")
            .bind(tq_id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
        if attached > 0 {
            return Err(StoreError::NotEmpty(tq_id));
        }

        sqlx::query("DELETE FROM tq_multi_values WHERE tq_id = ?1")
            .bind(tq_id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        let owner_group: Option<(String,)> =
            sqlx::query_as("DELETE FROM tq_task_queues WHERE tq_id = ?1 RETURNING owner_group")
                .bind(tq_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;

        let Some((owner_group,)) = owner_group else {
            return Err(StoreError::UnknownTaskQueue(tq_id));
        };

        tx.commit().await.map_err(map_err)?;
        Ok(owner_group)
    }

    async fn delete_tq_if_empty(&self, tq_id: TqId) -> StoreResult<Option<String>> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let (attached,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tq_jobs WHERE tq_id = ?1")
            .bind(tq_id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
        if attached > 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM tq_multi_values WHERE tq_id = ?1")
            .bind(tq_id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        let owner_group: Option<(String,)> =
            sqlx::query_as("DELETE FROM tq_task_queues WHERE tq_id = ?1 RETURNING owner_group")
                .bind(tq_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(owner_group.map(|(group,)| group))
    }

    async fn retrieve_tqs(&self) -> StoreResult<Vec<TaskQueueDescriptor>> {
        let scalars: Vec<(i64, Option<String>, String, String, i64, f64, f64)> = sqlx::query_as(
            "SELECT tq_id, owner_dn, owner_group, setup, cpu_time, priority, share FROM tq_task_queues",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let multi_values: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT tq_id, field, value FROM tq_multi_values")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;

        let job_counts: Vec<(i64, i64)> =
            sqlx::query_as("SELECT tq_id, COUNT(*) FROM tq_jobs GROUP BY tq_id")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
        let jobs_by_tq: HashMap<i64, i64> = job_counts.into_iter().collect();

        let mut fields_by_tq: HashMap<i64, HashMap<String, BTreeSet<String>>> = HashMap::new();
        for (tq_id, field, value) in multi_values {
            fields_by_tq
                .entry(tq_id)
                .or_default()
                .entry(field)
                .or_default()
                .insert(value);
        }

        Ok(scalars
            .into_iter()
            .map(|(tq_id, owner_dn, owner_group, setup, cpu_time, priority, share)| {
                let mut fields = fields_by_tq.remove(&tq_id).unwrap_or_default();
                TaskQueueDescriptor {
                    tq_id: TqId::new(tq_id),
                    owner_dn,
                    owner_group,
                    setup,
                    cpu_time,
                    sites: fields.remove("Sites").unwrap_or_default(),
                    banned_sites: fields.remove("BannedSites").unwrap_or_default(),
                    grid_ces: fields.remove("GridCEs").unwrap_or_default(),
                    job_types: fields.remove("JobTypes").unwrap_or_default(),
                    submit_pools: fields.remove("SubmitPools").unwrap_or_default(),
                    pilot_types: fields.remove("PilotTypes").unwrap_or_default(),
                    platforms: fields.remove("Platforms").unwrap_or_default(),
                    tags: fields.remove("Tags").unwrap_or_default(),
                    required_tags: fields.remove("RequiredTags").unwrap_or_default(),
                    priority,
                    share,
                    jobs: jobs_by_tq.get(&tq_id).copied().unwrap_or(0),
                }
            })
            .collect())
    }

    async fn get_num_task_queues(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tq_task_queues")
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn clean_orphaned_task_queues(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let orphaned: Vec<(i64,)> = sqlx::query_as(
            "DELETE FROM tq_task_queues
             WHERE tq_id IN (
                 SELECT t.tq_id FROM tq_task_queues t
                 WHERE NOT EXISTS (SELECT 1 FROM tq_jobs j WHERE j.tq_id = t.tq_id)
             )
             RETURNING tq_id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_err)?;

        sqlx::query(
            "DELETE FROM tq_multi_values WHERE tq_id NOT IN (SELECT tq_id FROM tq_task_queues)",
        )
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        let removed = orphaned.len() as u64;
        if removed > 0 {
            debug!(removed, "cleaned orphaned task queues");
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn find_orphan_jobs(&self) -> StoreResult<Vec<JobId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT j.job_id FROM tq_jobs j
             WHERE NOT EXISTS (SELECT 1 FROM tq_task_queues t WHERE t.tq_id = j.tq_id)",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        let orphans: Vec<JobId> = rows.into_iter().map(|(id,)| JobId::new(id)).collect();
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "found jobs attached to a vanished task queue");
        }
        Ok(orphans)
    }

    #[instrument(skip(self))]
    async fn purge_expired_requests(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM proxydb_requests WHERE expiration_time < ?1")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_proxies(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM proxydb_proxies WHERE expiration_time < ?1 AND persistent_flag = 0",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn raw_priorities_by_group(&self) -> StoreResult<BTreeMap<String, Vec<RawPriority>>> {
        let rows: Vec<(i64, String, f64)> =
            sqlx::query_as("SELECT tq_id, owner_group, priority FROM tq_task_queues")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;

        let mut by_group: BTreeMap<String, Vec<RawPriority>> = BTreeMap::new();
        for (tq_id, owner_group, priority) in rows {
            by_group.entry(owner_group).or_default().push(RawPriority {
                tq_id: TqId::new(tq_id),
                raw: priority,
            });
        }
        Ok(by_group)
    }

    async fn update_shares(&self, shares: &HashMap<TqId, f64>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        for (tq_id, share) in shares {
            sqlx::query("UPDATE tq_task_queues SET share = ?1 WHERE tq_id = ?2")
                .bind(share)
                .bind(tq_id.get())
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
        }
        tx.commit().await.map_err(map_err)?;
        Ok(())
    }
}
