//! `recalculate-shares` subcommand.

use anyhow::Result;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;

pub async fn run(scheduler: &Scheduler<SqliteStore>, group: Option<String>) -> Result<()> {
    match group {
        Some(group) => {
            scheduler
                .recalculate_tq_shares_for_group(&group, None)
                .await?;
            println!("recalculated shares for group {group}");
        }
        None => {
            scheduler.recalculate_tq_shares_for_all(None).await?;
            println!("recalculated shares for all groups");
        }
    }
    Ok(())
}
