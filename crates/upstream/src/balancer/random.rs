//! Uniform random selection.

use std::sync::Arc;

use crate::host::{Host, PrioritySet};
use crate::rng::RandomGenerator;
use crate::runtime::RuntimeLoader;
use crate::stats::ClusterStats;

use super::{LoadBalancer, LoadBalancerBase, RequestContext};

/// Picks uniformly from the candidate pool. Protects against degenerate
/// request patterns better than round-robin when callers are themselves
/// synchronized.
pub struct RandomLoadBalancer {
    base: LoadBalancerBase,
}

impl RandomLoadBalancer {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: Arc<ClusterStats>,
        runtime: Arc<dyn RuntimeLoader>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        Self {
            base: LoadBalancerBase::new(priority_set, local_priority_set, stats, runtime, random),
        }
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn choose_host(&self, _context: Option<&RequestContext>) -> Option<Arc<Host>> {
        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }
        Some(hosts[self.base.random_index(hosts.len())].clone())
    }
}
