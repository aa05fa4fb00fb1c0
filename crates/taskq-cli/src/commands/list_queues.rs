//! `list-queues` subcommand.

use anyhow::Result;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;

pub async fn run(scheduler: &Scheduler<SqliteStore>, json: bool) -> Result<()> {
    let mut tqs: Vec<_> = scheduler
        .retrieve_task_queues(None)
        .await?
        .into_values()
        .collect();
    tqs.sort_by_key(|tq| tq.tq_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&tqs)?);
        return Ok(());
    }

    println!(
        "{:>8}  {:<20}  {:<12}  {:>10}  {:>8}  {:>6}  {:>5}",
        "TQ_ID", "OWNER_GROUP", "SETUP", "CPU_TIME", "PRIORITY", "SHARE", "JOBS"
    );
    for tq in &tqs {
        println!(
            "{:>8}  {:<20}  {:<12}  {:>10}  {:>8.2}  {:>6.3}  {:>5}",
            tq.tq_id.get(),
            tq.owner_group,
            tq.setup,
            tq.cpu_time,
            tq.priority,
            tq.share,
            tq.jobs
        );
    }
    Ok(())
}
