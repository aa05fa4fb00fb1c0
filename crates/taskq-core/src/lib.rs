//! Requirement schema, fingerprinting, matching algebra, priority engine, and the public
//! scheduler facade for the task queue.
//!
//! This crate is backend-agnostic: it defines [`store_trait::TaskQueueStore`] as the seam a
//! concrete persistence layer implements (see the sibling `taskq-store` crate's SQLite
//! implementation) and [`scheduler::Scheduler`] as the facade that wires that store together
//! with matching and priority logic into the operations callers actually use.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod matcher;
pub mod platform;
pub mod priority;
pub mod requirements;
pub mod scheduler;
pub mod store_trait;

pub use config::{SchedulerConfig, SchedulerConfigFile};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use ids::{JobId, TqId};
pub use matcher::{ResourceDescription, TaskQueueDescriptor};
pub use platform::{PlatformOrder, PlatformOrderConfig};
pub use priority::RawPriority;
pub use requirements::{normalise, CanonicalRequirements, Requirements};
pub use scheduler::{MatchOutcome, Scheduler};
pub use store_trait::{StoreError, StoreResult, TaskQueueStore};
