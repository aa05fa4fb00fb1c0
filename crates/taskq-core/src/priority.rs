//! Priority/share engine.
//!
//! Shares are a derived view over raw per-TQ priorities, recomputed on demand — never persisted
//! as the source of truth. [`normalise_group_shares`] implements the per-group normalisation the
//! design calls for; [`crate::scheduler::Scheduler::recalculate_tq_shares_for_all`] fans this out
//! across every `OwnerGroup` the store currently knows about.

use std::collections::HashMap;

use crate::ids::TqId;

/// A TQ's raw priority input to share normalisation, grouped by `owner_group` by the caller.
#[derive(Debug, Clone, Copy)]
pub struct RawPriority {
    /// Which TQ this priority belongs to.
    pub tq_id: TqId,
    /// Configured per-group floor, optionally boosted by per-job hints. Always non-negative.
    pub raw: f64,
}

/// Normalise raw priorities within a single `OwnerGroup` so their shares sum to 1.
///
/// An empty input (no active TQs in the group) returns an empty map — the group's share is
/// implicitly 0, never a divide-by-zero. Negative raw priorities are clamped to 0 before
/// normalisation, since a negative weight has no sensible meaning in a weighted-random
/// selection.
#[must_use]
pub fn normalise_group_shares(raw: &[RawPriority]) -> HashMap<TqId, f64> {
    let clamped: Vec<(TqId, f64)> = raw.iter().map(|p| (p.tq_id, p.raw.max(0.0))).collect();
    let total: f64 = clamped.iter().map(|(_, r)| r).sum();

    if total <= 0.0 {
        // All-zero group: fall back to a uniform split so the group is not starved outright.
        let n = clamped.len();
        if n == 0 {
            return HashMap::new();
        }
        let even_share = 1.0 / n as f64;
        return clamped.into_iter().map(|(id, _)| (id, even_share)).collect();
    }

    clamped
        .into_iter()
        .map(|(id, r)| (id, r / total))
        .collect()
}
