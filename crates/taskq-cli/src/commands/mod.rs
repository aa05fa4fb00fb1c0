//! One module per subcommand, each a thin translation from parsed args to a scheduler call.

pub mod clean_orphans;
pub mod delete_job;
pub mod insert_job;
pub mod insert_job_json;
pub mod list_queues;
pub mod match_cmd;
pub mod recalculate_shares;
