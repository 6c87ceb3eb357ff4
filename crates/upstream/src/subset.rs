//! Read-only snapshot of a cluster's subset load balancing setup.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{LbSubsetConfig, SubsetFallbackPolicy};

/// Immutable view of how hosts may be partitioned on metadata keys.
///
/// The subset balancer layered above this engine consults the snapshot; the
/// engine itself only carries it. Selector order is preserved; selectors with
/// no keys contribute nothing.
#[derive(Debug, Clone)]
pub struct SubsetInfo {
    enabled: bool,
    fallback_policy: SubsetFallbackPolicy,
    default_subset: BTreeMap<String, serde_json::Value>,
    subset_keys: Vec<BTreeSet<String>>,
}

impl SubsetInfo {
    pub fn new(config: &LbSubsetConfig) -> Self {
        let subset_keys = config
            .subset_selectors
            .iter()
            .filter(|selector| !selector.keys.is_empty())
            .map(|selector| selector.keys.iter().cloned().collect())
            .collect();

        Self {
            enabled: !config.subset_selectors.is_empty(),
            fallback_policy: config.fallback_policy,
            default_subset: config.default_subset.clone(),
            subset_keys,
        }
    }

    /// Whether any subset selector was configured.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fallback_policy(&self) -> SubsetFallbackPolicy {
        self.fallback_policy
    }

    pub fn default_subset(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.default_subset
    }

    /// Key sets in selector order, empty selectors dropped.
    pub fn subset_keys(&self) -> &[BTreeSet<String>] {
        &self.subset_keys
    }
}
