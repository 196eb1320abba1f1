//! Voting-center configuration mapping.
//!
//! Maps each voting center key to the set of community keys grouped under
//! it. Delivered by the remote `center_config` collection and used as the
//! referential target when validating drafts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration mapping of voting center → communities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CenterMap {
    centers: BTreeMap<String, BTreeSet<String>>,
}

impl CenterMap {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a community under a center, creating the center if needed.
    pub fn add_community(&mut self, center: impl Into<String>, community: impl Into<String>) {
        self.centers
            .entry(center.into())
            .or_default()
            .insert(community.into());
    }

    /// Whether the center key is configured at all.
    #[must_use]
    pub fn has_center(&self, center: &str) -> bool {
        self.centers.contains_key(center)
    }

    /// Whether the community belongs to the center's configured set.
    #[must_use]
    pub fn contains(&self, center: &str, community: &str) -> bool {
        self.centers
            .get(center)
            .is_some_and(|set| set.contains(community))
    }

    /// Communities configured under a center, if any.
    #[must_use]
    pub fn communities_for(&self, center: &str) -> Option<&BTreeSet<String>> {
        self.centers.get(center)
    }

    /// All configured center keys.
    pub fn center_keys(&self) -> impl Iterator<Item = &String> {
        self.centers.keys()
    }

    /// Number of configured centers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// Whether no centers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}
