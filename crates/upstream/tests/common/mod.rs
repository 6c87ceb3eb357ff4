//! Shared helpers for balancer integration tests: scripted randomness, a
//! settable runtime store, and host-building shorthand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use vigil_upstream::host::{Host, HostVector, HostsPerLocality};
use vigil_upstream::rng::RandomGenerator;
use vigil_upstream::runtime::RuntimeLoader;

/// Random source that replays a scripted sequence, then zeroes.
pub struct ScriptedRandom {
    draws: Mutex<VecDeque<u64>>,
}

impl ScriptedRandom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            draws: Mutex::new(VecDeque::new()),
        })
    }

    /// Append draws to the script.
    pub fn script(&self, draws: &[u64]) {
        self.draws.lock().unwrap().extend(draws.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.draws.lock().unwrap().len()
    }
}

impl RandomGenerator for ScriptedRandom {
    fn next_u64(&self) -> u64 {
        self.draws.lock().unwrap().pop_front().unwrap_or(0)
    }
}

/// Runtime store with per-test overrides for integers and feature gates.
pub struct MockRuntime {
    integers: Mutex<HashMap<String, u64>>,
    features: Mutex<HashMap<String, bool>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            integers: Mutex::new(HashMap::new()),
            features: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_integer(&self, key: &str, value: u64) {
        self.integers.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn set_feature(&self, key: &str, enabled: bool) {
        self.features.lock().unwrap().insert(key.to_string(), enabled);
    }
}

impl RuntimeLoader for MockRuntime {
    fn get_integer(&self, key: &str, default: u64) -> u64 {
        self.integers
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    fn feature_enabled(&self, key: &str, default_percent: u64) -> bool {
        self.features
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(default_percent >= 100)
    }
}

pub fn make_host(address: &str) -> Arc<Host> {
    Arc::new(Host::new(address))
}

pub fn make_weighted_host(address: &str, weight: u32) -> Arc<Host> {
    Arc::new(Host::with_weight(address, weight))
}

pub fn host_vec(hosts: &[&Arc<Host>]) -> HostVector {
    Arc::new(hosts.iter().map(|h| Arc::clone(h)).collect())
}

pub fn localities(groups: &[&[Arc<Host>]]) -> HostsPerLocality {
    Arc::new(
        groups
            .iter()
            .map(|group| Arc::new(group.to_vec()) as HostVector)
            .collect(),
    )
}

pub fn no_localities() -> HostsPerLocality {
    Arc::new(Vec::new())
}
