//! Layered scheduler configuration.
//!
//! Mirrors the corpus's layered-config convention: built-in defaults, overridden by a TOML file,
//! overridden by environment variables. The result is a single [`SchedulerConfig`] value built
//! once and threaded explicitly into [`crate::scheduler::Scheduler::new`] — there is no global or
//! static configuration state anywhere in this crate.

use serde::{Deserialize, Serialize};

use crate::platform::PlatformOrderConfig;
use crate::requirements::DEFAULT_CPU_TIME_BUCKETS;

/// Resolved scheduler configuration, after defaults, file, and env layers have all been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pool ceiling for the backing store's connection pool.
    pub max_connections: u32,
    /// Ascending ladder `CPUTime` is rounded up into.
    pub cpu_time_buckets: Vec<i64>,
    /// Partial order over platform identifiers.
    pub platform_order: PlatformOrderConfig,
    /// How long an inserted job's implicit "request" stays valid before housekeeping purges it,
    /// in seconds.
    pub default_request_lifetime_secs: i64,
    /// Bounded retry count for the detach race in `match_and_get_job` before giving up with
    /// `NoMatch`.
    pub match_retry_budget: u32,
    /// Whether [`crate::requirements::from_dynamic_fields`] rejects a requirement bag carrying
    /// fields outside the closed vocabulary outright (`true`) or silently drops them (`false`).
    /// Only consulted at that dynamic-bag ingestion boundary; callers building a
    /// [`crate::requirements::Requirements`] value directly bypass it entirely.
    pub strict_unknown_fields: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            cpu_time_buckets: DEFAULT_CPU_TIME_BUCKETS.to_vec(),
            platform_order: PlatformOrderConfig::default(),
            default_request_lifetime_secs: 24 * 60 * 60,
            match_retry_budget: 3,
            strict_unknown_fields: false,
        }
    }
}

/// Partial configuration as it is read from a TOML file: every field optional, so an absent key
/// leaves the corresponding default (or earlier layer's value) untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfigFile {
    /// See [`SchedulerConfig::max_connections`].
    pub max_connections: Option<u32>,
    /// See [`SchedulerConfig::cpu_time_buckets`].
    pub cpu_time_buckets: Option<Vec<i64>>,
    /// See [`SchedulerConfig::platform_order`].
    pub platform_order: Option<PlatformOrderConfig>,
    /// See [`SchedulerConfig::default_request_lifetime_secs`].
    pub default_request_lifetime_secs: Option<i64>,
    /// See [`SchedulerConfig::match_retry_budget`].
    pub match_retry_budget: Option<u32>,
    /// See [`SchedulerConfig::strict_unknown_fields`].
    pub strict_unknown_fields: Option<bool>,
}

impl SchedulerConfig {
    /// Overlay a parsed TOML file's present fields on top of `self`.
    pub fn merge_file(&mut self, file: SchedulerConfigFile) {
        if let Some(v) = file.max_connections {
            self.max_connections = v;
        }
        if let Some(v) = file.cpu_time_buckets {
            self.cpu_time_buckets = v;
        }
        if let Some(v) = file.platform_order {
            self.platform_order = v;
        }
        if let Some(v) = file.default_request_lifetime_secs {
            self.default_request_lifetime_secs = v;
        }
        if let Some(v) = file.match_retry_budget {
            self.match_retry_budget = v;
        }
        if let Some(v) = file.strict_unknown_fields {
            self.strict_unknown_fields = v;
        }
    }

    /// Overlay `TASKQ_*` environment variable overrides on top of `self`. Reads through a
    /// caller-supplied lookup function so this stays unit-testable without touching the
    /// process's real environment.
    pub fn merge_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TASKQ_MAX_CONNECTIONS").and_then(|s| s.parse().ok()) {
            self.max_connections = v;
        }
        if let Some(v) = lookup("TASKQ_DEFAULT_REQUEST_LIFETIME_SECS").and_then(|s| s.parse().ok())
        {
            self.default_request_lifetime_secs = v;
        }
        if let Some(v) = lookup("TASKQ_MATCH_RETRY_BUDGET").and_then(|s| s.parse().ok()) {
            self.match_retry_budget = v;
        }
        if let Some(v) = lookup("TASKQ_STRICT_UNKNOWN_FIELDS").and_then(|s| s.parse().ok()) {
            self.strict_unknown_fields = v;
        }
        if let Some(v) = lookup("TASKQ_CPU_TIME_BUCKETS") {
            if let Some(buckets) = parse_bucket_list(&v) {
                self.cpu_time_buckets = buckets;
            }
        }
    }
}

fn parse_bucket_list(raw: &str) -> Option<Vec<i64>> {
    raw.split(',')
        .map(|s| s.trim().parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_option_table() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.match_retry_budget, 3);
        assert!(!config.strict_unknown_fields);
        assert_eq!(config.cpu_time_buckets, DEFAULT_CPU_TIME_BUCKETS);
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let mut config = SchedulerConfig::default();
        config.merge_file(SchedulerConfigFile {
            max_connections: Some(25),
            strict_unknown_fields: Some(true),
            ..Default::default()
        });
        assert_eq!(config.max_connections, 25);
        assert!(config.strict_unknown_fields);
        assert_eq!(config.match_retry_budget, 3);
    }

    #[test]
    fn env_layer_overrides_file_layer() {
        let mut config = SchedulerConfig::default();
        config.merge_file(SchedulerConfigFile {
            max_connections: Some(25),
            ..Default::default()
        });

        let mut env = HashMap::new();
        env.insert("TASKQ_MAX_CONNECTIONS".to_string(), "40".to_string());
        env.insert(
            "TASKQ_CPU_TIME_BUCKETS".to_string(),
            "100,200,300".to_string(),
        );
        config.merge_env(|key| env.get(key).cloned());

        assert_eq!(config.max_connections, 40);
        assert_eq!(config.cpu_time_buckets, vec![100, 200, 300]);
    }

    #[test]
    fn unset_env_vars_leave_prior_layer_untouched() {
        let mut config = SchedulerConfig::default();
        config.merge_env(|_| None);
        assert_eq!(config, SchedulerConfig::default());
    }
}
