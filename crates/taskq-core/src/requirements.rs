//! Requirement schema & vocabulary.
//!
//! Declares every known requirement field, its matching mode, and cardinality, and supplies
//! [`normalise`] — the single choke point through which a job's requested requirements become
//! the canonical form every other component (fingerprinting, the store, the matcher) relies on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The full set of multi-valued requirement fields a task queue may carry rows for.
///
/// Ordering here is also the canonical column order used when serialising a requirement vector
/// for fingerprinting.
pub const MULTI_VALUE_FIELDS: &[&str] = &[
    "Sites",
    "BannedSites",
    "GridCEs",
    "JobTypes",
    "SubmitPools",
    "PilotTypes",
    "Platforms",
    "Tags",
    "RequiredTags",
];

/// Default CPU time bucket ladder, ascending. A job's `CPUTime` is rounded up (ceiling) to the
/// nearest entry; jobs exceeding the last bucket keep the last bucket's value.
pub const DEFAULT_CPU_TIME_BUCKETS: &[i64] =
    &[500, 1800, 10800, 43200, 86400, 250_000, 500_000, 1_000_000];

/// Round `cpu_time` up to the nearest bucket boundary in `buckets` (which must be sorted
/// ascending). Values above the largest bucket saturate at that bucket.
#[must_use]
pub fn bucket_cpu_time(cpu_time: i64, buckets: &[i64]) -> i64 {
    buckets
        .iter()
        .find(|&&b| cpu_time <= b)
        .copied()
        .unwrap_or_else(|| buckets.last().copied().unwrap_or(cpu_time))
}

/// Requirements as submitted by a job producer, before validation or normalisation.
///
/// Unlike [`CanonicalRequirements`], multi-valued fields here are plain `Vec<String>` (possibly
/// containing duplicates or out-of-order values) and `cpu_time` carries the raw, unbucketed
/// value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    /// Delegated owner's distinguished name, already validated upstream.
    pub owner_dn: Option<String>,
    /// Owner's group, already validated upstream.
    pub owner_group: String,
    /// Application setup/environment name.
    pub setup: String,
    /// Requested CPU time budget, in seconds, raw (pre-bucketing).
    pub cpu_time: i64,
    /// Sites the job may run at. Empty means "any site".
    pub sites: Vec<String>,
    /// Sites the job must not run at.
    pub banned_sites: Vec<String>,
    /// Grid computing elements the job may run on.
    pub grid_ces: Vec<String>,
    /// Job type tags (e.g. "User", "MC").
    pub job_types: Vec<String>,
    /// Submission pools the job is restricted to.
    pub submit_pools: Vec<String>,
    /// Pilot types the job is compatible with.
    pub pilot_types: Vec<String>,
    /// Acceptable platform families, under the configured partial order.
    pub platforms: Vec<String>,
    /// Capabilities the job needs the matcher to *offer*.
    pub tags: Vec<String>,
    /// Capabilities the job insists the matcher's resource *advertise*.
    pub required_tags: Vec<String>,
}

/// Requirements after [`normalise`]: deduplicated, sorted, case-folded where appropriate, and
/// with `cpu_time` bucketed. This is the only form the fingerprint, the store, and the matcher
/// ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRequirements {
    /// See [`Requirements::owner_dn`].
    pub owner_dn: Option<String>,
    /// See [`Requirements::owner_group`].
    pub owner_group: String,
    /// See [`Requirements::setup`].
    pub setup: String,
    /// Bucketed CPU time; the ceiling of the raw value into the configured bucket ladder.
    pub cpu_time: i64,
    /// See [`Requirements::sites`], deduplicated and sorted.
    pub sites: BTreeSet<String>,
    /// See [`Requirements::banned_sites`], deduplicated and sorted.
    pub banned_sites: BTreeSet<String>,
    /// See [`Requirements::grid_ces`], deduplicated and sorted.
    pub grid_ces: BTreeSet<String>,
    /// See [`Requirements::job_types`], deduplicated and sorted.
    pub job_types: BTreeSet<String>,
    /// See [`Requirements::submit_pools`], deduplicated and sorted.
    pub submit_pools: BTreeSet<String>,
    /// See [`Requirements::pilot_types`], deduplicated and sorted.
    pub pilot_types: BTreeSet<String>,
    /// See [`Requirements::platforms`], deduplicated and sorted.
    pub platforms: BTreeSet<String>,
    /// See [`Requirements::tags`], deduplicated and sorted.
    pub tags: BTreeSet<String>,
    /// See [`Requirements::required_tags`], deduplicated and sorted.
    pub required_tags: BTreeSet<String>,
}

fn dedup_sorted(values: &[String], lowercase: bool) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| if lowercase { v.to_lowercase() } else { v })
        .collect()
}

/// Normalise a raw [`Requirements`] into its canonical form.
///
/// - Site, grid CE, job type, submit pool, pilot type, and platform values are case-folded to
///   lowercase (they are infrastructure identifiers); tag values keep their case (capability
///   names like `MultiProcessor` are conventionally mixed-case).
/// - `OwnerDN` is never case-folded: it is a certificate subject, which is case-sensitive.
/// - `cpu_time` is rounded up to the nearest entry of `cpu_time_buckets`.
/// - Multi-valued lists are deduplicated and sorted, so two jobs differing only in list order
///   or duplicate entries land in the same task queue.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] if `owner_group` or `setup` is blank, or if `cpu_time` is
/// negative.
pub fn normalise(reqs: &Requirements, cpu_time_buckets: &[i64]) -> Result<CanonicalRequirements> {
    if reqs.owner_group.trim().is_empty() {
        return Err(Error::bad_request("OwnerGroup", "must not be blank"));
    }
    if reqs.setup.trim().is_empty() {
        return Err(Error::bad_request("Setup", "must not be blank"));
    }
    if reqs.cpu_time < 0 {
        return Err(Error::bad_request("CPUTime", "must not be negative"));
    }

    Ok(CanonicalRequirements {
        owner_dn: reqs
            .owner_dn
            .as_ref()
            .map(|dn| dn.trim().to_string())
            .filter(|dn| !dn.is_empty()),
        owner_group: reqs.owner_group.trim().to_string(),
        setup: reqs.setup.trim().to_string(),
        cpu_time: bucket_cpu_time(reqs.cpu_time, cpu_time_buckets),
        sites: dedup_sorted(&reqs.sites, true),
        banned_sites: dedup_sorted(&reqs.banned_sites, true),
        grid_ces: dedup_sorted(&reqs.grid_ces, true),
        job_types: dedup_sorted(&reqs.job_types, true),
        submit_pools: dedup_sorted(&reqs.submit_pools, true),
        pilot_types: dedup_sorted(&reqs.pilot_types, true),
        platforms: dedup_sorted(&reqs.platforms, true),
        tags: dedup_sorted(&reqs.tags, false),
        required_tags: dedup_sorted(&reqs.required_tags, false),
    })
}

fn value_as_string(field: &str, value: &serde_json::Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::bad_request(field, "must be a string"))
}

fn value_as_opt_string(field: &str, value: &serde_json::Value) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    value_as_string(field, value).map(Some)
}

fn value_as_i64(field: &str, value: &serde_json::Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::bad_request(field, "must be an integer"))
}

fn value_as_string_list(field: &str, value: &serde_json::Value) -> Result<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| Error::bad_request(field, "must be an array of strings"))?
        .iter()
        .map(|v| value_as_string(field, v))
        .collect()
}

/// Build a [`Requirements`] value out of a dynamic field bag — the shape a legacy producer
/// submitting a loosely-typed parameter map (e.g. a decoded JSON object) sends, as opposed to
/// the closed, typed construction every in-process caller of [`crate::scheduler::Scheduler`]
/// uses.
///
/// Field names are matched case-insensitively against [`MULTI_VALUE_FIELDS`] and the scalar
/// fields (`OwnerDN`, `OwnerGroup`, `Setup`, `CPUTime`). `strict_unknown_fields` decides what
/// happens to anything outside that vocabulary: rejected outright (`true`) or silently dropped
/// (`false`), per the configured [`crate::config::SchedulerConfig::strict_unknown_fields`].
///
/// The result still has to pass through [`normalise`] before it is canonical.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] if a known field holds the wrong JSON shape (`CPUTime` not a
/// number, a multi-valued field not an array of strings), or if `strict_unknown_fields` is set
/// and the bag carries a field outside the closed vocabulary.
pub fn from_dynamic_fields(
    fields: &serde_json::Map<String, serde_json::Value>,
    strict_unknown_fields: bool,
) -> Result<Requirements> {
    let mut reqs = Requirements::default();

    for (key, value) in fields {
        match key.to_lowercase().as_str() {
            "ownerdn" => reqs.owner_dn = value_as_opt_string(key, value)?,
            "ownergroup" => reqs.owner_group = value_as_string(key, value)?,
            "setup" => reqs.setup = value_as_string(key, value)?,
            "cputime" => reqs.cpu_time = value_as_i64(key, value)?,
            "sites" => reqs.sites = value_as_string_list(key, value)?,
            "bannedsites" => reqs.banned_sites = value_as_string_list(key, value)?,
            "gridces" => reqs.grid_ces = value_as_string_list(key, value)?,
            "jobtypes" => reqs.job_types = value_as_string_list(key, value)?,
            "submitpools" => reqs.submit_pools = value_as_string_list(key, value)?,
            "pilottypes" => reqs.pilot_types = value_as_string_list(key, value)?,
            "platforms" => reqs.platforms = value_as_string_list(key, value)?,
            "tags" => reqs.tags = value_as_string_list(key, value)?,
            "requiredtags" => reqs.required_tags = value_as_string_list(key, value)?,
            _ if strict_unknown_fields => {
                return Err(Error::bad_request(key, "unknown requirement field"));
            }
            _ => {}
        }
    }

    Ok(reqs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_reqs() -> Requirements {
        Requirements {
            owner_dn: Some("/my/DN".to_string()),
            owner_group: "myGroup".to_string(),
            setup: "aSetup".to_string(),
            cpu_time: 50_000,
            ..Default::default()
        }
    }

    #[test]
    fn bucket_ceiling_matches_spec_scenario() {
        assert_eq!(bucket_cpu_time(50_000, DEFAULT_CPU_TIME_BUCKETS), 86_400);
        assert_eq!(bucket_cpu_time(500, DEFAULT_CPU_TIME_BUCKETS), 500);
        assert_eq!(bucket_cpu_time(5_000_000, DEFAULT_CPU_TIME_BUCKETS), 1_000_000);
    }

    #[test]
    fn site_order_and_duplicates_do_not_affect_canonical_form() {
        let mut a = base_reqs();
        a.sites = vec!["Site_A".to_string(), "Site_B".to_string()];
        let mut b = base_reqs();
        b.sites = vec![
            "site_b".to_string(),
            "Site_A".to_string(),
            "SITE_A".to_string(),
        ];

        let ca = normalise(&a, DEFAULT_CPU_TIME_BUCKETS).expect("normalise a");
        let cb = normalise(&b, DEFAULT_CPU_TIME_BUCKETS).expect("normalise b");
        assert_eq!(ca.sites, cb.sites);
    }

    #[test]
    fn tags_preserve_case() {
        let mut reqs = base_reqs();
        reqs.tags = vec!["MultiProcessor".to_string()];
        let canonical = normalise(&reqs, DEFAULT_CPU_TIME_BUCKETS).expect("normalise");
        assert!(canonical.tags.contains("MultiProcessor"));
        assert!(!canonical.tags.contains("multiprocessor"));
    }

    #[test]
    fn blank_owner_group_is_bad_request() {
        let mut reqs = base_reqs();
        reqs.owner_group = "  ".to_string();
        let err = normalise(&reqs, DEFAULT_CPU_TIME_BUCKETS).unwrap_err();
        assert!(matches!(err, Error::BadRequest { field, .. } if field == "OwnerGroup"));
    }

    #[test]
    fn from_dynamic_fields_matches_field_names_case_insensitively() {
        let bag = serde_json::json!({
            "ownergroup": "myGroup",
            "Setup": "aSetup",
            "CPUTIME": 50_000,
            "Sites": ["Site_A", "Site_B"],
        });
        let reqs = from_dynamic_fields(bag.as_object().unwrap(), false).expect("parse");
        assert_eq!(reqs.owner_group, "myGroup");
        assert_eq!(reqs.setup, "aSetup");
        assert_eq!(reqs.cpu_time, 50_000);
        assert_eq!(reqs.sites, vec!["Site_A", "Site_B"]);
    }

    #[test]
    fn from_dynamic_fields_drops_unknown_fields_when_not_strict() {
        let bag = serde_json::json!({
            "OwnerGroup": "myGroup",
            "Setup": "aSetup",
            "CPUTime": 1,
            "SomeLegacyAttribute": "whatever",
        });
        let reqs = from_dynamic_fields(bag.as_object().unwrap(), false).expect("parse");
        assert_eq!(reqs.owner_group, "myGroup");
    }

    #[test]
    fn from_dynamic_fields_rejects_unknown_fields_when_strict() {
        let bag = serde_json::json!({
            "OwnerGroup": "myGroup",
            "Setup": "aSetup",
            "CPUTime": 1,
            "SomeLegacyAttribute": "whatever",
        });
        let err = from_dynamic_fields(bag.as_object().unwrap(), true).unwrap_err();
        assert!(matches!(err, Error::BadRequest { field, .. } if field == "SomeLegacyAttribute"));
    }

    #[test]
    fn from_dynamic_fields_rejects_wrong_shaped_known_field() {
        let bag = serde_json::json!({
            "OwnerGroup": "myGroup",
            "Setup": "aSetup",
            "CPUTime": "not a number",
        });
        let err = from_dynamic_fields(bag.as_object().unwrap(), false).unwrap_err();
        assert!(matches!(err, Error::BadRequest { field, .. } if field == "CPUTime"));
    }

    #[test]
    fn empty_platform_and_absent_platform_are_both_empty_sets() {
        let mut with_empty = base_reqs();
        with_empty.platforms = vec![String::new()];
        let mut absent = base_reqs();
        absent.platforms = vec![];

        let c1 = normalise(&with_empty, DEFAULT_CPU_TIME_BUCKETS).expect("normalise");
        let c2 = normalise(&absent, DEFAULT_CPU_TIME_BUCKETS).expect("normalise");
        assert!(c1.platforms.is_empty());
        assert_eq!(c1.platforms, c2.platforms);
    }
}
