//! Platform family partial order.
//!
//! Platform compatibility used to be expressed as strings with an implicit, hard-coded ordering
//! (`centos7` "is" `slc6` "is" `slc5`). Here it is an explicit DAG loaded once at startup from
//! configuration: the matcher consults [`PlatformOrder`], never platform-name prefixes.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single `ancestor -> descendant` edge: descendant platforms satisfy requirements pinned to
/// the ancestor. E.g. `("slc5", "slc6")` in spec notation `centos7 > slc6 > slc5` reads as
/// "slc6 descends from (is newer/more capable than) slc5", recorded here as `slc6 -> slc5`
/// meaning "a resource offering slc6 satisfies a TQ requiring slc5".
pub type PlatformEdge = (String, String);

/// Partial order over platform identifiers, built from configured edges and closed under
/// transitivity.
#[derive(Debug, Clone, Default)]
pub struct PlatformOrder {
    /// `descendant -> set of ancestors it satisfies`, transitively closed (includes itself).
    satisfies: HashMap<String, HashSet<String>>,
}

/// Raw, unvalidated edge list as it would come from configuration/TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformOrderConfig {
    /// `[descendant, ancestor]` pairs: descendant satisfies ancestor.
    pub edges: Vec<PlatformEdge>,
}

impl PlatformOrder {
    /// Build a [`PlatformOrder`] from configured edges, computing the transitive closure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] if the edges contain a cycle (a platform cannot descend
    /// from itself through any chain).
    pub fn build(config: &PlatformOrderConfig) -> Result<Self> {
        let mut direct: HashMap<String, HashSet<String>> = HashMap::new();
        for (descendant, ancestor) in &config.edges {
            direct
                .entry(descendant.to_lowercase())
                .or_default()
                .insert(ancestor.to_lowercase());
        }

        let mut satisfies: HashMap<String, HashSet<String>> = HashMap::new();
        for platform in direct.keys() {
            let mut seen = HashSet::new();
            seen.insert(platform.clone());
            let mut frontier: Vec<String> = vec![platform.clone()];
            while let Some(current) = frontier.pop() {
                if let Some(ancestors) = direct.get(&current) {
                    for ancestor in ancestors {
                        if seen.insert(ancestor.clone()) {
                            if ancestor == platform {
                                return Err(Error::bad_request(
                                    "platform_order",
                                    format!("cycle detected involving '{platform}'"),
                                ));
                            }
                            frontier.push(ancestor.clone());
                        }
                    }
                }
            }
            satisfies.insert(platform.clone(), seen);
        }

        Ok(Self { satisfies })
    }

    /// Does a resource offering `resource_platform` satisfy a requirement pinned to
    /// `required_platform`? True when equal, or when `required_platform` is a (possibly
    /// transitive) ancestor of `resource_platform` under the configured order.
    #[must_use]
    pub fn satisfies(&self, resource_platform: &str, required_platform: &str) -> bool {
        let resource = resource_platform.to_lowercase();
        let required = required_platform.to_lowercase();
        if resource == required {
            return true;
        }
        self.satisfies
            .get(&resource)
            .is_some_and(|ancestors| ancestors.contains(&required))
    }

    /// True if a resource offering any platform in `resource_platforms` satisfies *some* entry
    /// of `tq_platforms`. An empty `tq_platforms` always matches (no platform constraint); an
    /// empty `resource_platforms` always matches (resource is platform-agnostic).
    #[must_use]
    pub fn any_satisfies(
        &self,
        resource_platforms: &BTreeSet<String>,
        tq_platforms: &BTreeSet<String>,
    ) -> bool {
        if tq_platforms.is_empty() || resource_platforms.is_empty() {
            return true;
        }
        resource_platforms.iter().any(|resource| {
            tq_platforms
                .iter()
                .any(|required| self.satisfies(resource, required))
        })
    }
}
