//! `taskq` operator CLI.
//!
//! A thin shell around [`taskq_core::scheduler::Scheduler`]'s public API; no matching or
//! priority logic lives here.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use taskq_core::scheduler::Scheduler;
use taskq_store::SqliteStore;

mod cli;
mod commands;
mod config;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::load(cli.config.as_deref())?;
    let store = Arc::new(SqliteStore::connect(&cli.database, config.max_connections).await?);
    let scheduler = Scheduler::new(store, config)?;

    match cli.command {
        Command::InsertJob {
            job_id,
            owner_group,
            setup,
            cpu_time,
            owner_dn,
            priority,
            requirements,
        } => {
            commands::insert_job::run(
                &scheduler,
                job_id,
                owner_group,
                setup,
                cpu_time,
                owner_dn,
                priority,
                requirements,
            )
            .await
        }
        Command::InsertJobFromJson {
            job_id,
            priority,
            file,
        } => commands::insert_job_json::run(&scheduler, job_id, priority, file).await,
        Command::DeleteJob { job_id } => commands::delete_job::run(&scheduler, job_id).await,
        Command::ListQueues { json } => commands::list_queues::run(&scheduler, json).await,
        Command::Match {
            setup,
            cpu_time,
            owner_group,
            num_queues_to_get,
            banned_tag,
            dispatch,
            resources,
        } => {
            commands::match_cmd::run(
                &scheduler,
                setup,
                cpu_time,
                owner_group,
                num_queues_to_get,
                banned_tag,
                dispatch,
                resources,
            )
            .await
        }
        Command::RecalculateShares { group } => {
            commands::recalculate_shares::run(&scheduler, group).await
        }
        Command::CleanOrphans => commands::clean_orphans::run(&scheduler).await,
    }
}
