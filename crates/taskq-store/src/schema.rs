//! SQLite schema and connection-pool bootstrap.
//!
//! Follows the corpus's layered-string-schema convention: one `CREATE TABLE IF NOT EXISTS` block
//! run once against a fresh pool, rather than a migrations directory — this scheduler has no
//! shipped-schema history to migrate between yet.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::map_err;
use taskq_core::store_trait::StoreResult;

/// Scalar task-queue rows, one per fingerprint.
///
/// `fingerprint` is the hex-encoded [`taskq_core::Fingerprint`]; `owner_dn` is nullable because
/// it is an optional restriction, never a matching key on its own. `priority`/`share` mirror
/// [`taskq_core::matcher::TaskQueueDescriptor`] and are derived state recomputed by the priority
/// engine, never hand-edited.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tq_task_queues (
    tq_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    owner_dn    TEXT,
    owner_group TEXT NOT NULL,
    setup       TEXT NOT NULL,
    cpu_time    INTEGER NOT NULL,
    priority    REAL NOT NULL DEFAULT 0,
    share       REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tq_task_queues_owner_group ON tq_task_queues(owner_group);

-- One row per (tq_id, field, value): Sites, BannedSites, GridCEs, JobTypes, SubmitPools,
-- PilotTypes, Platforms, Tags, RequiredTags all share this table rather than one table each,
-- per the "alternatively a single (tqId, field, value) table" note in the persisted layout.
CREATE TABLE IF NOT EXISTS tq_multi_values (
    tq_id INTEGER NOT NULL REFERENCES tq_task_queues(tq_id),
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(tq_id, field, value)
);

CREATE INDEX IF NOT EXISTS idx_tq_multi_values_tq_id ON tq_multi_values(tq_id);

CREATE TABLE IF NOT EXISTS tq_jobs (
    job_id        INTEGER PRIMARY KEY,
    tq_id         INTEGER NOT NULL REFERENCES tq_task_queues(tq_id),
    enqueued_at   TEXT NOT NULL,
    priority_hint REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tq_jobs_tq_id ON tq_jobs(tq_id);
CREATE INDEX IF NOT EXISTS idx_tq_jobs_enqueued_at ON tq_jobs(tq_id, enqueued_at, job_id);

-- Companion credential tables the scheduler exposes purge hooks for (ProxyDB_Requests /
-- ProxyDB_Proxies in the upstream credential store); the scheduler never reads or writes these
-- outside of purge_expired_requests/purge_expired_proxies.
CREATE TABLE IF NOT EXISTS proxydb_requests (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_dn         TEXT NOT NULL,
    user_group      TEXT NOT NULL,
    pem             TEXT NOT NULL,
    expiration_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proxydb_requests_expiration ON proxydb_requests(expiration_time);

CREATE TABLE IF NOT EXISTS proxydb_proxies (
    user_dn         TEXT NOT NULL,
    user_group      TEXT NOT NULL,
    pem             TEXT NOT NULL,
    expiration_time TEXT NOT NULL,
    persistent_flag INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_dn, user_group)
);

CREATE INDEX IF NOT EXISTS idx_proxydb_proxies_expiration ON proxydb_proxies(expiration_time);
";

/// Open (creating if absent) a `SQLite` database at `database_url` and bound the pool to
/// `max_connections`, per [`taskq_core::SchedulerConfig::max_connections`].
pub(crate) async fn create_connection_pool(
    database_url: &str,
    max_connections: u32,
) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_err)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(map_err)?;

    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await
        .map_err(map_err)?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .map_err(map_err)?;

    Ok(pool)
}

/// Run [`SCHEMA`] against `pool`. Idempotent — safe to call on every process start.
pub(crate) async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(SCHEMA).execute(pool).await.map_err(map_err)?;
    Ok(())
}
