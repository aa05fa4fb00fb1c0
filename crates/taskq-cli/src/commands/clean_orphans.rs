//! `clean-orphans` subcommand.

use anyhow::Result;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;

pub async fn run(scheduler: &Scheduler<SqliteStore>) -> Result<()> {
    let removed = scheduler.clean_orphaned_task_queues(None).await?;
    println!("removed {removed} orphaned task queue(s)");

    let orphan_jobs = scheduler.find_orphan_jobs(None).await?;
    if !orphan_jobs.is_empty() {
        println!("warning: {} job(s) attached to a vanished task queue", orphan_jobs.len());
        for job_id in orphan_jobs {
            println!("  {job_id}");
        }
    }
    Ok(())
}
