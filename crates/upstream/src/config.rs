//! Balancer configuration messages.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use vigil_common::{VigilError, VigilResult};

/// What to do when no subset matches the request metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsetFallbackPolicy {
    /// Fail the selection.
    #[default]
    NoFallback,
    /// Fall back to any endpoint in the cluster.
    AnyEndpoint,
    /// Fall back to the subset described by `default_subset`.
    DefaultSubset,
}

/// One subset selector: the metadata keys hosts are partitioned on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetSelector {
    pub keys: Vec<String>,
}

/// Subset load balancing configuration for a cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LbSubsetConfig {
    pub fallback_policy: SubsetFallbackPolicy,
    pub default_subset: BTreeMap<String, serde_json::Value>,
    pub subset_selectors: Vec<SubsetSelector>,
}

impl LbSubsetConfig {
    /// Reject configurations that would silently never match anything.
    pub fn validate(&self) -> VigilResult<()> {
        if self.fallback_policy == SubsetFallbackPolicy::DefaultSubset
            && self.default_subset.is_empty()
        {
            return Err(VigilError::config(
                "default_subset fallback policy requires a non-empty default_subset",
            ));
        }

        for selector in &self.subset_selectors {
            let unique: BTreeSet<&str> = selector.keys.iter().map(String::as_str).collect();
            if unique.len() != selector.keys.len() {
                return Err(VigilError::config("subset selector contains duplicate keys"));
            }
        }

        Ok(())
    }
}
