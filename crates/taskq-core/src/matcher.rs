//! Matching algebra: compiling a resource description against task queues.
//!
//! This module is pure logic — it knows nothing about the store. [`crate::scheduler::Scheduler`]
//! feeds it [`TaskQueueDescriptor`]s fetched from the store and a [`ResourceDescription`]
//! supplied by the caller, and uses [`select_candidates`] / [`pick_weighted`] to implement the
//! selection algorithm of the design (candidate predicate, share-ordered shortlist, weighted
//! random pick).

use std::collections::BTreeSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::TqId;
use crate::platform::PlatformOrder;

/// Default upper bound on candidate TQs a match request returns.
pub const DEFAULT_NUM_QUEUES_TO_GET: usize = 1;

/// What a matcher consumer advertises about itself. Every field is optional/omittable; an
/// absent or empty multi-valued field means "place no constraint on this dimension".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceDescription {
    /// Exact-match required setup name. `None` means any setup.
    pub setup: Option<String>,
    /// CPU time on offer; must be `>=` the TQ's bucketed `CPUTime`. `None` means unconstrained.
    pub cpu_time: Option<i64>,
    /// Acceptable owner groups. Empty means any group.
    pub owner_group: Vec<String>,
    /// Exact-match optional owner DN restriction.
    pub owner_dn: Option<String>,
    /// Sites on offer.
    pub site: Vec<String>,
    /// Platforms on offer.
    pub platform: Vec<String>,
    /// Capabilities offered (upper bound on the TQ's `Tags`).
    pub tag: Vec<String>,
    /// Capabilities the resource insists the TQ carry (lower bound on the TQ's `Tags`).
    pub required_tag: Vec<String>,
    /// Capabilities the resource refuses to run if the TQ carries them.
    pub banned_tag: Vec<String>,
    /// Job types on offer.
    pub job_type: Vec<String>,
    /// Submit pools on offer.
    pub submit_pool: Vec<String>,
    /// Pilot types on offer.
    pub pilot_type: Vec<String>,
    /// Grid CEs on offer.
    pub grid_ce: Vec<String>,
    /// Upper bound on the number of candidate TQs to return.
    pub num_queues_to_get: Option<usize>,
}

impl ResourceDescription {
    fn num_queues_to_get(&self) -> usize {
        self.num_queues_to_get
            .unwrap_or(DEFAULT_NUM_QUEUES_TO_GET)
            .max(1)
    }
}

fn lowercase_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Like [`lowercase_set`], but preserves case — for tag fields, whose capability names are
/// conventionally mixed-case. Still strips blank/whitespace-only entries, so `Tag: [""]` (the
/// DIRAC `{'Tag': ''}` idiom for "no constraint") means the same "accepts anything" as an absent
/// `Tag`, not an assertion that the TQ's tags must be a subset of the empty set.
fn trimmed_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Read-only view of a task queue's scalar and multi-value content, as returned by the store for
/// matching and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueueDescriptor {
    /// Surrogate key.
    pub tq_id: TqId,
    /// See [`crate::requirements::CanonicalRequirements::owner_dn`].
    pub owner_dn: Option<String>,
    /// See [`crate::requirements::CanonicalRequirements::owner_group`].
    pub owner_group: String,
    /// See [`crate::requirements::CanonicalRequirements::setup`].
    pub setup: String,
    /// Bucketed CPU time.
    pub cpu_time: i64,
    /// See [`crate::requirements::CanonicalRequirements::sites`].
    pub sites: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::banned_sites`].
    pub banned_sites: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::grid_ces`].
    pub grid_ces: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::job_types`].
    pub job_types: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::submit_pools`].
    pub submit_pools: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::pilot_types`].
    pub pilot_types: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::platforms`].
    pub platforms: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::tags`].
    pub tags: BTreeSet<String>,
    /// See [`crate::requirements::CanonicalRequirements::required_tags`].
    pub required_tags: BTreeSet<String>,
    /// Raw priority, floor-configured per group and boosted by per-job hints.
    pub priority: f64,
    /// Normalised share within `owner_group`, in `[0, 1]`.
    pub share: f64,
    /// Number of jobs currently attached.
    pub jobs: i64,
}

/// Positive-inclusion check: `tq_values` empty means "accepts anything"; otherwise the offered
/// values must intersect it.
fn positive_inclusion_matches(offered: &BTreeSet<String>, tq_values: &BTreeSet<String>) -> bool {
    tq_values.is_empty() || offered.is_empty() || !offered.is_disjoint(tq_values)
}

/// Does `tq` satisfy `resource`, under the rules of the design's matching algebra?
///
/// # Errors
///
/// Returns [`Error::BadRequest`] if `resource.cpu_time` is negative.
pub fn matches(
    order: &PlatformOrder,
    resource: &ResourceDescription,
    tq: &TaskQueueDescriptor,
) -> Result<bool> {
    if let Some(cpu_time) = resource.cpu_time {
        if cpu_time < 0 {
            return Err(Error::bad_request("CPUTime", "must not be negative"));
        }
        if cpu_time < tq.cpu_time {
            return Ok(false);
        }
    }

    if let Some(setup) = &resource.setup {
        if setup != &tq.setup {
            return Ok(false);
        }
    }

    if let Some(owner_dn) = &resource.owner_dn {
        if tq.owner_dn.as_deref() != Some(owner_dn.as_str()) {
            return Ok(false);
        }
    }

    if !resource.owner_group.is_empty() {
        let groups = lowercase_set(&resource.owner_group);
        if !groups.contains(&tq.owner_group.to_lowercase()) {
            return Ok(false);
        }
    }

    let offered_sites = lowercase_set(&resource.site);
    if !positive_inclusion_matches(&offered_sites, &tq.sites) {
        return Ok(false);
    }
    if !offered_sites.is_disjoint(&tq.banned_sites) {
        return Ok(false);
    }

    if !positive_inclusion_matches(&lowercase_set(&resource.grid_ce), &tq.grid_ces) {
        return Ok(false);
    }
    if !positive_inclusion_matches(&lowercase_set(&resource.job_type), &tq.job_types) {
        return Ok(false);
    }
    if !positive_inclusion_matches(&lowercase_set(&resource.submit_pool), &tq.submit_pools) {
        return Ok(false);
    }
    if !positive_inclusion_matches(&lowercase_set(&resource.pilot_type), &tq.pilot_types) {
        return Ok(false);
    }

    let offered_platforms = lowercase_set(&resource.platform);
    if !order.any_satisfies(&offered_platforms, &tq.platforms) {
        return Ok(false);
    }

    // Tag is an upper bound on the TQ's carried tags: TQ.Tags subset_of offered. An offered
    // tag list of `[""]` (DIRAC's `{'Tag': ''}`) means "no constraint", same as an empty list.
    let offered_tags = trimmed_set(&resource.tag);
    if !offered_tags.is_empty() && !tq.tags.is_subset(&offered_tags) {
        return Ok(false);
    }
    // RequiredTag is a lower bound: required subset_of TQ.Tags.
    let required = trimmed_set(&resource.required_tag);
    if !required.is_subset(&tq.tags) {
        return Ok(false);
    }
    // BannedTag: TQ must carry none of these.
    let banned = trimmed_set(&resource.banned_tag);
    if !tq.tags.is_disjoint(&banned) {
        return Ok(false);
    }

    Ok(true)
}

/// Filter `tqs` down to those matching `resource`, ordered by descending share then ascending
/// `tq_id`, truncated to `resource`'s requested `numQueuesToGet` (default 1).
///
/// This is `matchAndGetTaskQueue`'s core: it never dequeues a job, just ranks compatible TQs.
pub fn select_candidates(
    order: &PlatformOrder,
    resource: &ResourceDescription,
    tqs: &[TaskQueueDescriptor],
) -> Result<Vec<TaskQueueDescriptor>> {
    let mut candidates = Vec::new();
    for tq in tqs {
        if matches(order, resource, tq)? {
            candidates.push(tq.clone());
        }
    }
    candidates.sort_by(|a, b| {
        b.share
            .partial_cmp(&a.share)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.tq_id.cmp(&b.tq_id))
    });
    candidates.truncate(resource.num_queues_to_get());
    Ok(candidates)
}

/// Pick one TQ from `candidates` via weighted-random selection on `share`. TQs with share `0`
/// (e.g. in a still-unrecalculated group) fall back to uniform weight so a newly matched group
/// is not permanently starved before its first `recalculate_tq_shares_for_all`.
#[must_use]
pub fn pick_weighted<'a, R: Rng + ?Sized>(
    candidates: &'a [TaskQueueDescriptor],
    rng: &mut R,
) -> Option<&'a TaskQueueDescriptor> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return candidates.first();
    }
    let weights: Vec<f64> = candidates
        .iter()
        .map(|tq| if tq.share > 0.0 { tq.share } else { 1e-9 })
        .collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => candidates.get(dist.sample(rng)),
        Err(_) => candidates.first(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformOrderConfig;

    fn order() -> PlatformOrder {
        PlatformOrder::build(&PlatformOrderConfig {
            edges: vec![
                ("centos7".to_string(), "slc6".to_string()),
                ("slc6".to_string(), "slc5".to_string()),
            ],
        })
        .expect("order")
    }

    fn tq(id: i64) -> TaskQueueDescriptor {
        TaskQueueDescriptor {
            tq_id: TqId::new(id),
            owner_dn: None,
            owner_group: "myGroup".to_string(),
            setup: "aSetup".to_string(),
            cpu_time: 86_400,
            sites: BTreeSet::new(),
            banned_sites: BTreeSet::new(),
            grid_ces: BTreeSet::new(),
            job_types: BTreeSet::new(),
            submit_pools: BTreeSet::new(),
            pilot_types: BTreeSet::new(),
            platforms: BTreeSet::new(),
            tags: BTreeSet::new(),
            required_tags: BTreeSet::new(),
            priority: 1.0,
            share: 1.0,
            jobs: 1,
        }
    }

    #[test]
    fn tag_empty_matches_any() {
        let mut t = tq(1);
        t.tags = ["MultiProcessor".to_string()].into_iter().collect();
        let resource = ResourceDescription::default();
        assert!(matches(&order(), &resource, &t).expect("matches"));
    }

    #[test]
    fn tag_single_empty_string_matches_any() {
        let mut t = tq(1);
        t.tags = ["MultiProcessor".to_string()].into_iter().collect();
        let resource = ResourceDescription {
            tag: vec![String::new()],
            ..Default::default()
        };
        assert!(matches(&order(), &resource, &t).expect("matches"));
    }

    #[test]
    fn required_tag_rejects_missing_capability() {
        let t = tq(1);
        let resource = ResourceDescription {
            required_tag: vec!["SingleProcessor".to_string()],
            ..Default::default()
        };
        assert!(!matches(&order(), &resource, &t).expect("matches"));
    }

    #[test]
    fn banned_tag_allows_tq_without_it() {
        let mut t = tq(1);
        t.tags = ["MultiProcessor".to_string()].into_iter().collect();
        let resource = ResourceDescription {
            banned_tag: vec!["SingleProcessor".to_string()],
            ..Default::default()
        };
        assert!(matches(&order(), &resource, &t).expect("matches"));
    }

    #[test]
    fn owner_group_mismatch_excludes_tq() {
        let mut t = tq(1);
        t.owner_group = "admin".to_string();
        t.sites = ["site_1".to_string(), "site_2".to_string()]
            .into_iter()
            .collect();
        t.platforms = ["centos7".to_string()].into_iter().collect();
        let resource = ResourceDescription {
            platform: vec!["slc6".to_string(), "centos7".to_string()],
            owner_group: vec!["prod".to_string(), "user".to_string()],
            site: vec!["site_1".to_string()],
            ..Default::default()
        };
        assert!(!matches(&order(), &resource, &t).expect("matches"));

        let resource_with_admin = ResourceDescription {
            owner_group: vec!["prod".to_string(), "admin".to_string()],
            ..resource
        };
        assert!(matches(&order(), &resource_with_admin, &t).expect("matches"));
    }

    #[test]
    fn selection_orders_by_share_then_tq_id() {
        let mut low = tq(5);
        low.share = 0.2;
        let mut high = tq(2);
        high.share = 0.8;
        let tied_a = tq(10);
        let tied_b = {
            let mut t = tq(3);
            t.share = 1.0;
            t
        };

        let resource = ResourceDescription {
            num_queues_to_get: Some(4),
            ..Default::default()
        };
        let candidates =
            select_candidates(&order(), &resource, &[low, high, tied_a, tied_b.clone()])
                .expect("select");
        assert_eq!(candidates[0].tq_id, tied_b.tq_id);
    }
}
