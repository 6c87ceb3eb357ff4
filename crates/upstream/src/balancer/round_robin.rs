//! Round-robin selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::host::{Host, PrioritySet};
use crate::rng::RandomGenerator;
use crate::runtime::RuntimeLoader;
use crate::stats::ClusterStats;

use super::{LoadBalancer, LoadBalancerBase, RequestContext};

/// Rotates through the candidate pool with a single monotonic counter.
///
/// The counter is never reset on membership changes; reducing it modulo the
/// current pool size keeps the rotation stable enough, and avoids a reset
/// stampede onto the first host.
pub struct RoundRobinLoadBalancer {
    base: LoadBalancerBase,
    rr_index: AtomicU64,
}

impl RoundRobinLoadBalancer {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: Arc<ClusterStats>,
        runtime: Arc<dyn RuntimeLoader>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        Self {
            base: LoadBalancerBase::new(priority_set, local_priority_set, stats, runtime, random),
            rr_index: AtomicU64::new(0),
        }
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn choose_host(&self, _context: Option<&RequestContext>) -> Option<Arc<Host>> {
        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }
        let index = self.rr_index.fetch_add(1, Ordering::Relaxed) as usize % hosts.len();
        Some(hosts[index].clone())
    }
}
