//! Command-line surface.
//!
//! A thin shell around [`taskq_core::scheduler::Scheduler`]'s public API: every subcommand here
//! maps to exactly one scheduler operation and contains no matching or priority logic of its
//! own, per the CLI's scoping as infrastructure rather than core behavior.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Operator CLI for the task queue scheduler.
#[derive(Debug, Parser)]
#[command(name = "taskq", version, about = "Operator CLI for the task queue scheduler")]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `./taskq.toml` if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database URL, e.g. `sqlite://taskq.db?mode=rwc`.
    #[arg(long, global = true, default_value = "sqlite://taskq.db?mode=rwc")]
    pub database: String,

    /// Raise logging verbosity to `debug`. `RUST_LOG` takes precedence if set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Multi-valued requirement/resource fields shared by `insert-job` and `match`, expressed as
/// repeatable or comma-separated flags.
#[derive(Debug, Args, Default)]
pub struct MultiValueArgs {
    /// Acceptable sites. Repeatable or comma-separated.
    #[arg(long = "site", value_delimiter = ',')]
    pub sites: Vec<String>,
    /// Sites to exclude. Repeatable or comma-separated.
    #[arg(long = "banned-site", value_delimiter = ',')]
    pub banned_sites: Vec<String>,
    /// Grid computing elements. Repeatable or comma-separated.
    #[arg(long = "grid-ce", value_delimiter = ',')]
    pub grid_ces: Vec<String>,
    /// Job type tags. Repeatable or comma-separated.
    #[arg(long = "job-type", value_delimiter = ',')]
    pub job_types: Vec<String>,
    /// Submission pools. Repeatable or comma-separated.
    #[arg(long = "submit-pool", value_delimiter = ',')]
    pub submit_pools: Vec<String>,
    /// Pilot types. Repeatable or comma-separated.
    #[arg(long = "pilot-type", value_delimiter = ',')]
    pub pilot_types: Vec<String>,
    /// Platform families. Repeatable or comma-separated.
    #[arg(long = "platform", value_delimiter = ',')]
    pub platforms: Vec<String>,
    /// Capability tags. Repeatable or comma-separated.
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Required capability tags. Repeatable or comma-separated.
    #[arg(long = "required-tag", value_delimiter = ',')]
    pub required_tags: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Insert a job's requirements, creating or reusing its task queue.
    InsertJob {
        /// Job identifier.
        #[arg(long)]
        job_id: i64,
        /// Owning group.
        #[arg(long)]
        owner_group: String,
        /// Application setup name.
        #[arg(long)]
        setup: String,
        /// Requested CPU time, in seconds, pre-bucketing.
        #[arg(long)]
        cpu_time: i64,
        /// Delegated owner distinguished name.
        #[arg(long)]
        owner_dn: Option<String>,
        /// Raw priority, non-negative.
        #[arg(long, default_value_t = 1.0)]
        priority: f64,
        #[command(flatten)]
        requirements: MultiValueArgs,
    },
    /// Insert a job whose requirements are a dynamic JSON object read from a file (or stdin)
    /// rather than individual flags — the ingestion path for legacy producers, and the one
    /// place `strict_unknown_fields` is actually consulted.
    InsertJobFromJson {
        /// Job identifier.
        #[arg(long)]
        job_id: i64,
        /// Raw priority, non-negative.
        #[arg(long, default_value_t = 1.0)]
        priority: f64,
        /// Path to a JSON object of requirement fields. Reads stdin if omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Detach a job from wherever it is attached. Idempotent.
    DeleteJob {
        /// Job identifier.
        #[arg(long)]
        job_id: i64,
    },
    /// List every live task queue.
    ListQueues {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Match a resource description against task queues, optionally dispatching a job.
    Match {
        /// Exact-match required setup name.
        #[arg(long)]
        setup: Option<String>,
        /// CPU time on offer.
        #[arg(long)]
        cpu_time: Option<i64>,
        /// Acceptable owner groups. Repeatable or comma-separated.
        #[arg(long = "owner-group", value_delimiter = ',')]
        owner_group: Vec<String>,
        /// Upper bound on the number of candidate TQs to return in preview mode.
        #[arg(long)]
        num_queues_to_get: Option<usize>,
        /// Capability tags that rule a task queue out if it carries any of them. Repeatable or
        /// comma-separated. Not part of `MultiValueArgs`: it has no `Requirements` counterpart,
        /// it only ever applies to the resource side of a match.
        #[arg(long = "banned-tag", value_delimiter = ',')]
        banned_tag: Vec<String>,
        /// Dequeue and print the oldest job from the matched queue instead of only previewing
        /// candidates.
        #[arg(long)]
        dispatch: bool,
        #[command(flatten)]
        resources: MultiValueArgs,
    },
    /// Recompute normalised shares for every owner group, or a single one with `--group`.
    RecalculateShares {
        /// Limit recalculation to this owner group.
        #[arg(long)]
        group: Option<String>,
    },
    /// Delete task queues with zero attached jobs.
    CleanOrphans,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_job_parses_repeated_and_comma_separated_multi_value_flags() {
        let cli = Cli::try_parse_from([
            "taskq",
            "insert-job",
            "--job-id",
            "1",
            "--owner-group",
            "myGroup",
            "--setup",
            "aSetup",
            "--cpu-time",
            "50000",
            "--site",
            "Site_A",
            "--site",
            "Site_B,Site_C",
        ])
        .expect("parses");

        let Command::InsertJob {
            job_id,
            owner_group,
            requirements,
            ..
        } = cli.command
        else {
            panic!("expected InsertJob");
        };
        assert_eq!(job_id, 1);
        assert_eq!(owner_group, "myGroup");
        assert_eq!(requirements.sites, vec!["Site_A", "Site_B", "Site_C"]);
    }

    #[test]
    fn insert_job_from_json_defaults_to_stdin_and_unit_priority() {
        let cli = Cli::try_parse_from(["taskq", "insert-job-from-json", "--job-id", "7"])
            .expect("parses");
        let Command::InsertJobFromJson {
            job_id,
            priority,
            file,
        } = cli.command
        else {
            panic!("expected InsertJobFromJson");
        };
        assert_eq!(job_id, 7);
        assert!((priority - 1.0).abs() < f64::EPSILON);
        assert!(file.is_none());
    }

    #[test]
    fn match_requires_no_arguments_by_default() {
        let cli = Cli::try_parse_from(["taskq", "match"]).expect("parses");
        let Command::Match { dispatch, .. } = cli.command else {
            panic!("expected Match");
        };
        assert!(!dispatch);
    }

    #[test]
    fn missing_required_insert_job_fields_is_a_parse_error() {
        assert!(Cli::try_parse_from(["taskq", "insert-job", "--job-id", "1"]).is_err());
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["taskq", "clean-orphans", "--verbose"]).expect("parses");
        assert!(cli.verbose);
    }
}
