//! `SQLite`-backed implementation of [`taskq_core::store_trait::TaskQueueStore`].
//!
//! This crate is the only place that knows a database exists. [`SqliteStore`] persists task
//! queues, their multi-value requirement rows, and attached jobs behind the trait defined in
//! `taskq-core`, so [`taskq_core::scheduler::Scheduler`] never depends on `sqlx` directly.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod schema;
mod store;

pub use store::SqliteStore;

fn map_err(err: sqlx::Error) -> taskq_core::store_trait::StoreError {
    taskq_core::store_trait::StoreError::Unavailable(err.to_string())
}
