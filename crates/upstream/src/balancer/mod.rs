//! Load balancing policies and their shared selection substrate.
//!
//! Every policy funnels through [`LoadBalancerBase::hosts_to_use`], which
//! resolves the effective host set (priority failover), decides whether panic
//! mode forces unhealthy hosts into the pool, and applies locality-aware
//! routing when a local cluster view is available. The policies themselves
//! only decide which host to take out of the resulting list.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use vigil_common::LoadBalancingAlgorithm;

use crate::host::{empty_host_vector, CallbackHandle, Host, HostSet, HostVector, PrioritySet};
use crate::rng::RandomGenerator;
use crate::runtime::{RuntimeLoader, DEFAULT_HEALTHY_PANIC_THRESHOLD, HEALTHY_PANIC_THRESHOLD};
use crate::stats::ClusterStats;

pub mod least_request;
pub mod locality;
pub mod random;
pub mod round_robin;

pub use least_request::LeastRequestLoadBalancer;
pub use locality::LocalityRoutingState;
pub use random::RandomLoadBalancer;
pub use round_robin::RoundRobinLoadBalancer;

use locality::PerPriorityState;

/// Per-request context handed through to the balancer. The core policies do
/// not inspect it; subset- and hash-based policies layered above do.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<SocketAddr>,
    pub headers: HashMap<String, String>,
    pub path: String,
    pub method: String,
}

/// A load balancing policy over a priority set.
pub trait LoadBalancer: Send + Sync {
    /// Select one host for the request, or `None` when no host exists at any
    /// priority. Runs synchronously to completion.
    fn choose_host(&self, context: Option<&RequestContext>) -> Option<Arc<Host>>;
}

/// Whether the host set is too unhealthy to filter by health.
///
/// Below the threshold we prefer routing to unhealthy hosts over failing the
/// request, on the theory that the health signal itself is likely broken. An
/// empty set is not panic; the caller reports "no hosts" separately.
pub fn is_global_panic(host_set: &HostSet, runtime: &dyn RuntimeLoader) -> bool {
    let threshold = runtime
        .get_integer(HEALTHY_PANIC_THRESHOLD, DEFAULT_HEALTHY_PANIC_THRESHOLD)
        .min(100);
    let hosts = host_set.hosts().len() as u64;
    if hosts == 0 {
        return false;
    }
    let healthy = host_set.healthy_hosts().len() as u64;
    // Truncating division decides identically to the exact quotient here,
    // since the threshold is an integer.
    100 * healthy / hosts < threshold
}

/// Routing state derived from the priority sets, rebuilt on every membership
/// change and shared with the membership callbacks that rebuild it.
#[derive(Default)]
pub(crate) struct LbSharedState {
    best_available_priority: AtomicU32,
    pub(crate) per_priority: RwLock<Vec<PerPriorityState>>,
}

impl LbSharedState {
    /// Rebuild everything derived from membership: the best available
    /// priority and the locality routing state of every priority. Gentle
    /// failover can promote any priority, so all of them stay precomputed.
    fn recompute(
        &self,
        priority_set: &PrioritySet,
        local_priority_set: Option<&PrioritySet>,
        runtime: &dyn RuntimeLoader,
        stats: &ClusterStats,
    ) {
        let host_sets = priority_set.host_sets();

        let best_available = host_sets
            .iter()
            .find(|host_set| !host_set.healthy_hosts().is_empty())
            .map(|host_set| host_set.priority())
            .unwrap_or(0);
        self.best_available_priority
            .store(best_available, Ordering::Relaxed);

        let mut states = self.per_priority.write().unwrap();
        states.resize_with(host_sets.len(), PerPriorityState::default);
        for host_set in &host_sets {
            states[host_set.priority() as usize] = locality::regenerate_locality_routing_structures(
                host_set,
                local_priority_set,
                runtime,
                stats,
            );
        }

        debug!(
            best_available_priority = best_available,
            priorities = host_sets.len(),
            "Recomputed balancer routing state"
        );
    }
}

/// Shared substrate embedded by every policy.
///
/// Owns the derived routing state and the membership subscriptions that keep
/// it fresh; the subscriptions are revoked when the substrate is dropped.
pub struct LoadBalancerBase {
    priority_set: Arc<PrioritySet>,
    stats: Arc<ClusterStats>,
    runtime: Arc<dyn RuntimeLoader>,
    random: Arc<dyn RandomGenerator>,
    pub(crate) shared: Arc<LbSharedState>,
    _member_update_cb: CallbackHandle,
    _local_member_update_cb: Option<CallbackHandle>,
}

impl LoadBalancerBase {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: Arc<ClusterStats>,
        runtime: Arc<dyn RuntimeLoader>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        let shared = Arc::new(LbSharedState::default());

        let member_update_cb = {
            let shared = Arc::downgrade(&shared);
            let upstream = priority_set.clone();
            let local = local_priority_set.clone();
            let runtime = runtime.clone();
            let stats = stats.clone();
            priority_set.add_member_update_cb(Box::new(move |_, _, _| {
                if let Some(shared) = shared.upgrade() {
                    shared.recompute(&upstream, local.as_deref(), runtime.as_ref(), &stats);
                }
            }))
        };

        let local_member_update_cb = local_priority_set.as_ref().map(|local_priority_set| {
            let shared = Arc::downgrade(&shared);
            let upstream = priority_set.clone();
            let local = local_priority_set.clone();
            let runtime = runtime.clone();
            let stats = stats.clone();
            local_priority_set.add_member_update_cb(Box::new(move |_, _, _| {
                if let Some(shared) = shared.upgrade() {
                    shared.recompute(&upstream, Some(&local), runtime.as_ref(), &stats);
                }
            }))
        });

        shared.recompute(
            &priority_set,
            local_priority_set.as_deref(),
            runtime.as_ref(),
            &stats,
        );

        Self {
            priority_set,
            stats,
            runtime,
            random,
            shared,
            _member_update_cb: member_update_cb,
            _local_member_update_cb: local_member_update_cb,
        }
    }

    pub fn stats(&self) -> &ClusterStats {
        &self.stats
    }

    pub(crate) fn runtime(&self) -> &dyn RuntimeLoader {
        self.runtime.as_ref()
    }

    pub(crate) fn random(&self) -> &dyn RandomGenerator {
        self.random.as_ref()
    }

    /// Uniform index draw over `len` elements. `len` must be non-zero.
    pub(crate) fn random_index(&self, len: usize) -> usize {
        (self.random.next_u64() % len as u64) as usize
    }

    /// The host set selection is made from: the lowest priority with healthy
    /// hosts, or priority 0 when none has any.
    fn best_available_host_set(&self) -> Option<Arc<HostSet>> {
        let priority = self.shared.best_available_priority.load(Ordering::Relaxed);
        self.priority_set.host_set(priority)
    }

    /// Resolve the candidate pool every policy picks from.
    pub fn hosts_to_use(&self) -> HostVector {
        let Some(host_set) = self.best_available_host_set() else {
            return empty_host_vector();
        };

        let hosts = host_set.hosts();
        if hosts.is_empty() {
            return empty_host_vector();
        }

        if is_global_panic(&host_set, self.runtime.as_ref()) {
            self.stats.lb_healthy_panic.inc();
            return hosts;
        }

        let states = self.shared.per_priority.read().unwrap();
        match states.get(host_set.priority() as usize) {
            Some(state) if state.routing_state != LocalityRoutingState::NoLocalityRouting => {
                self.try_choose_local_locality_hosts(&host_set, state)
            }
            _ => host_set.healthy_hosts(),
        }
    }
}

/// Build a policy from its configured algorithm.
pub fn create_load_balancer(
    algorithm: LoadBalancingAlgorithm,
    priority_set: Arc<PrioritySet>,
    local_priority_set: Option<Arc<PrioritySet>>,
    stats: Arc<ClusterStats>,
    runtime: Arc<dyn RuntimeLoader>,
    random: Arc<dyn RandomGenerator>,
) -> Arc<dyn LoadBalancer> {
    debug!(algorithm = %algorithm, "Creating load balancer");
    match algorithm {
        LoadBalancingAlgorithm::RoundRobin => Arc::new(RoundRobinLoadBalancer::new(
            priority_set,
            local_priority_set,
            stats,
            runtime,
            random,
        )),
        LoadBalancingAlgorithm::LeastRequest => Arc::new(LeastRequestLoadBalancer::new(
            priority_set,
            local_priority_set,
            stats,
            runtime,
            random,
        )),
        LoadBalancingAlgorithm::Random => Arc::new(RandomLoadBalancer::new(
            priority_set,
            local_priority_set,
            stats,
            runtime,
            random,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRuntime {
        panic_threshold: u64,
    }

    impl RuntimeLoader for FixedRuntime {
        fn get_integer(&self, key: &str, default: u64) -> u64 {
            if key == HEALTHY_PANIC_THRESHOLD {
                self.panic_threshold
            } else {
                default
            }
        }

        fn feature_enabled(&self, _key: &str, default_percent: u64) -> bool {
            default_percent >= 100
        }
    }

    fn host_set_with(healthy: usize, total: usize) -> Arc<HostSet> {
        let priority_set = PrioritySet::new();
        let host_set = priority_set.get_or_create_host_set(0);
        let hosts: HostVector = Arc::new(
            (0..total)
                .map(|i| Arc::new(Host::new(format!("10.0.0.{i}:80"))))
                .collect(),
        );
        let healthy_hosts: HostVector = Arc::new(hosts[..healthy].to_vec());
        host_set.update_hosts(hosts, healthy_hosts, Arc::new(Vec::new()), &[], &[]);
        host_set
    }

    #[test]
    fn test_panic_below_threshold() {
        let runtime = FixedRuntime { panic_threshold: 50 };
        assert!(is_global_panic(&host_set_with(2, 6), &runtime));
        assert!(!is_global_panic(&host_set_with(3, 6), &runtime));
    }

    #[test]
    fn test_empty_set_is_not_panic() {
        let runtime = FixedRuntime { panic_threshold: 50 };
        assert!(!is_global_panic(&host_set_with(0, 0), &runtime));
    }

    #[test]
    fn test_threshold_clamped_to_100() {
        let runtime = FixedRuntime {
            panic_threshold: 400,
        };
        // Fully healthy never panics even with an absurd threshold.
        assert!(!is_global_panic(&host_set_with(4, 4), &runtime));
        assert!(is_global_panic(&host_set_with(3, 4), &runtime));
    }

    #[test]
    fn test_zero_threshold_disables_panic() {
        let runtime = FixedRuntime { panic_threshold: 0 };
        assert!(!is_global_panic(&host_set_with(0, 6), &runtime));
    }
}
