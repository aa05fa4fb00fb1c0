//! `match` subcommand.

use anyhow::Result;
use taskq_core::matcher::ResourceDescription;
use taskq_core::scheduler::{MatchOutcome, Scheduler};
use taskq_store::SqliteStore;

use crate::cli::MultiValueArgs;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    scheduler: &Scheduler<SqliteStore>,
    setup: Option<String>,
    cpu_time: Option<i64>,
    owner_group: Vec<String>,
    num_queues_to_get: Option<usize>,
    banned_tag: Vec<String>,
    dispatch: bool,
    resources: MultiValueArgs,
) -> Result<()> {
    let description = ResourceDescription {
        setup,
        cpu_time,
        owner_group,
        owner_dn: None,
        site: resources.sites,
        platform: resources.platforms,
        tag: resources.tags,
        required_tag: resources.required_tags,
        banned_tag,
        job_type: resources.job_types,
        submit_pool: resources.submit_pools,
        pilot_type: resources.pilot_types,
        grid_ce: resources.grid_ces,
        num_queues_to_get,
    };

    if dispatch {
        match scheduler.match_and_get_job(&description, None).await? {
            MatchOutcome::Matched { tq_id, job_id } => {
                println!("dispatched job {job_id} from task queue {tq_id}");
            }
            MatchOutcome::NoMatch => println!("no match"),
        }
        return Ok(());
    }

    let candidates = scheduler
        .match_and_get_task_queue(&description, None)
        .await?;
    if candidates.is_empty() {
        println!("no match");
        return Ok(());
    }
    for tq_id in candidates {
        println!("{tq_id}");
    }
    Ok(())
}
