//! `insert-job-from-json` subcommand.
//!
//! Unlike `insert-job`, which builds a [`Requirements`](taskq_core::requirements::Requirements)
//! from typed clap flags, this reads a dynamic JSON object — the shape a legacy producer
//! submitting a loosely-typed parameter bag would send — and runs it through
//! [`taskq_core::requirements::from_dynamic_fields`], which is where the scheduler's
//! `strict_unknown_fields` setting actually gets consulted.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use taskq_core::ids::JobId;
use taskq_core::requirements::from_dynamic_fields;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;
use tracing::info;

pub async fn run(
    scheduler: &Scheduler<SqliteStore>,
    job_id: i64,
    priority: f64,
    file: Option<PathBuf>,
) -> Result<()> {
    let raw = match file {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading requirements from stdin")?;
            buf
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(&raw).context("parsing requirements JSON")?;
    let fields = value
        .as_object()
        .context("requirements JSON must be an object")?;
    let reqs = from_dynamic_fields(fields, scheduler.config().strict_unknown_fields)?;

    scheduler
        .insert_job(JobId::new(job_id), &reqs, priority, None)
        .await?;
    info!(job_id, "inserted from dynamic field bag");
    println!("job {job_id} inserted");
    Ok(())
}
