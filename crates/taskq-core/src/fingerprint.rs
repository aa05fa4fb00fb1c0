//! Task-queue identity.
//!
//! A [`Fingerprint`] is a stable hash over a [`CanonicalRequirements`] value. Two jobs whose
//! canonical requirements are equal always produce the same fingerprint, which is the property
//! `find_or_create_tq` relies on to keep the TQ population bounded — see the idempotency
//! property in the module-level docs of [`crate::scheduler`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::requirements::CanonicalRequirements;

/// Stable identity of a requirement vector, independent of insertion order.
///
/// Stored and compared as its hex representation; never parsed back into requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Render as a lowercase hex string, the form persisted in the store.
    #[must_use]
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Append a labelled multi-valued field's sorted members to the running hash.
///
/// `BTreeSet` iteration is already sorted, but the label and a length prefix keep fields from
/// being confusable when concatenated (`{Sites:[a,bc]}` cannot collide with `{Sites:[ab,c]}`).
fn hash_field(hasher: &mut Sha256, label: &str, values: &std::collections::BTreeSet<String>) {
    hasher.update(label.as_bytes());
    hasher.update((values.len() as u64).to_le_bytes());
    for v in values {
        hasher.update((v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }
}

/// Compute the [`Fingerprint`] of a canonical requirement vector.
///
/// Deterministic across process restarts and platforms: every field is fed to the hasher in a
/// fixed order with explicit length prefixes, never relying on `Debug`/`Display` formatting or
/// hash-map iteration order.
#[must_use]
pub fn fingerprint(reqs: &CanonicalRequirements) -> Fingerprint {
    let mut hasher = Sha256::new();

    hasher.update(b"owner_group\0");
    hasher.update(reqs.owner_group.as_bytes());
    hasher.update(b"\0setup\0");
    hasher.update(reqs.setup.as_bytes());
    hasher.update(b"\0owner_dn\0");
    hasher.update(reqs.owner_dn.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0cpu_time\0");
    hasher.update(reqs.cpu_time.to_le_bytes());

    hash_field(&mut hasher, "\0sites\0", &reqs.sites);
    hash_field(&mut hasher, "\0banned_sites\0", &reqs.banned_sites);
    hash_field(&mut hasher, "\0grid_ces\0", &reqs.grid_ces);
    hash_field(&mut hasher, "\0job_types\0", &reqs.job_types);
    hash_field(&mut hasher, "\0submit_pools\0", &reqs.submit_pools);
    hash_field(&mut hasher, "\0pilot_types\0", &reqs.pilot_types);
    hash_field(&mut hasher, "\0platforms\0", &reqs.platforms);
    hash_field(&mut hasher, "\0tags\0", &reqs.tags);
    hash_field(&mut hasher, "\0required_tags\0", &reqs.required_tags);

    let digest = hasher.finalize();
    let mut bytes = [0_u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::{normalise, Requirements, DEFAULT_CPU_TIME_BUCKETS};

    fn canonical(reqs: Requirements) -> CanonicalRequirements {
        normalise(&reqs, DEFAULT_CPU_TIME_BUCKETS).expect("normalise")
    }

    #[test]
    fn identical_vectors_fingerprint_identically() {
        let r = Requirements {
            owner_group: "myGroup".to_string(),
            setup: "aSetup".to_string(),
            cpu_time: 50_000,
            sites: vec!["Site_A".to_string(), "Site_B".to_string()],
            ..Default::default()
        };
        let mut r2 = r.clone();
        r2.sites = vec!["Site_B".to_string(), "Site_A".to_string()];

        assert_eq!(fingerprint(&canonical(r)), fingerprint(&canonical(r2)));
    }

    #[test]
    fn differing_fields_fingerprint_differently() {
        let mut a = Requirements {
            owner_group: "myGroup".to_string(),
            setup: "aSetup".to_string(),
            cpu_time: 50_000,
            ..Default::default()
        };
        let b = a.clone();
        a.sites = vec!["Site_A".to_string()];

        assert_ne!(fingerprint(&canonical(a)), fingerprint(&canonical(b)));
    }

    #[test]
    fn field_boundary_values_do_not_collide() {
        let mut a = Requirements {
            owner_group: "g".to_string(),
            setup: "s".to_string(),
            ..Default::default()
        };
        a.sites = vec!["a".to_string(), "bc".to_string()];
        let mut b = a.clone();
        b.sites = vec!["ab".to_string(), "c".to_string()];

        assert_ne!(fingerprint(&canonical(a)), fingerprint(&canonical(b)));
    }

    proptest::proptest! {
        /// Universal property 1: fingerprinting is insensitive to the order jobs list their
        /// sites in, for any site vocabulary.
        #[test]
        fn fingerprint_ignores_site_list_order(
            mut sites in proptest::collection::vec("[a-z]{1,8}", 0..6),
            owner_group in "[a-z]{1,8}",
            setup in "[a-z]{1,8}",
            cpu_time in 0_i64..2_000_000,
        ) {
            let base = Requirements {
                owner_group,
                setup,
                cpu_time,
                sites: sites.clone(),
                ..Default::default()
            };
            sites.reverse();
            let shuffled = Requirements { sites, ..base.clone() };

            proptest::prop_assert_eq!(
                fingerprint(&canonical(base)),
                fingerprint(&canonical(shuffled))
            );
        }
    }
}
