//! `insert-job` subcommand.

use anyhow::Result;
use taskq_core::ids::JobId;
use taskq_core::requirements::Requirements;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;
use tracing::info;

use crate::cli::MultiValueArgs;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    scheduler: &Scheduler<SqliteStore>,
    job_id: i64,
    owner_group: String,
    setup: String,
    cpu_time: i64,
    owner_dn: Option<String>,
    priority: f64,
    requirements: MultiValueArgs,
) -> Result<()> {
    let reqs = Requirements {
        owner_dn,
        owner_group,
        setup,
        cpu_time,
        sites: requirements.sites,
        banned_sites: requirements.banned_sites,
        grid_ces: requirements.grid_ces,
        job_types: requirements.job_types,
        submit_pools: requirements.submit_pools,
        pilot_types: requirements.pilot_types,
        platforms: requirements.platforms,
        tags: requirements.tags,
        required_tags: requirements.required_tags,
    };

    scheduler
        .insert_job(JobId::new(job_id), &reqs, priority, None)
        .await?;
    info!(job_id, "inserted");
    println!("job {job_id} inserted");
    Ok(())
}
