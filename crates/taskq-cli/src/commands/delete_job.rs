//! `delete-job` subcommand.

use anyhow::Result;
use taskq_core::ids::JobId;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;

pub async fn run(scheduler: &Scheduler<SqliteStore>, job_id: i64) -> Result<()> {
    scheduler.delete_job(JobId::new(job_id), None).await?;
    println!("job {job_id} deleted (if it existed)");
    Ok(())
}
