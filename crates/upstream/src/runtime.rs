//! Runtime configuration seam.
//!
//! The balancer reads a handful of integer keys from the proxy's runtime
//! store. [`RuntimeLoader`] abstracts that store down to the two lookups the
//! engine needs, so tests can pin values and deployments can flip behavior
//! without a reload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::rng::RandomGenerator;

/// Healthy-percentage floor below which panic mode engages.
pub const HEALTHY_PANIC_THRESHOLD: &str = "upstream.healthy_panic_threshold";
pub const DEFAULT_HEALTHY_PANIC_THRESHOLD: u64 = 50;

/// Feature gate (percentage) for locality-aware routing.
pub const ZONE_ROUTING_ENABLED: &str = "upstream.zone_routing.enabled";
pub const DEFAULT_ZONE_ROUTING_ENABLED: u64 = 100;

/// Minimum healthy cluster size for locality-aware routing.
pub const ZONE_ROUTING_MIN_CLUSTER_SIZE: &str = "upstream.zone_routing.min_cluster_size";
pub const DEFAULT_ZONE_ROUTING_MIN_CLUSTER_SIZE: u64 = 6;

/// If zero, forces equal-weight selection even when host weights differ.
pub const WEIGHT_ENABLED: &str = "upstream.weight_enabled";
pub const DEFAULT_WEIGHT_ENABLED: u64 = 1;

/// Keyed integer lookup with caller-supplied defaults.
pub trait RuntimeLoader: Send + Sync {
    /// Read an integer key, falling back to `default` when unset.
    fn get_integer(&self, key: &str, default: u64) -> u64;

    /// Percentage-based feature gate. `default_percent` applies when the key
    /// is unset; a value of 100 is always on, 0 always off, anything between
    /// enables the feature for that share of calls.
    fn feature_enabled(&self, key: &str, default_percent: u64) -> bool;
}

/// In-memory runtime store backed by a key/value map of overrides.
pub struct StaticRuntime {
    values: RwLock<HashMap<String, u64>>,
    random: Arc<dyn RandomGenerator>,
}

impl StaticRuntime {
    pub fn new(random: Arc<dyn RandomGenerator>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            random,
        }
    }

    /// Set or replace an override.
    pub fn set(&self, key: impl Into<String>, value: u64) {
        self.values.write().unwrap().insert(key.into(), value);
    }
}

impl RuntimeLoader for StaticRuntime {
    fn get_integer(&self, key: &str, default: u64) -> u64 {
        self.values
            .read()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    fn feature_enabled(&self, key: &str, default_percent: u64) -> bool {
        // Fully-on and fully-off gates must not consume a random draw: the
        // selection path relies on a deterministic draw sequence.
        match self.get_integer(key, default_percent).min(100) {
            100 => true,
            0 => false,
            percent => self.random.next_u64() % 100 < percent,
        }
    }
}
