//! Weighted least-request selection.
//!
//! With uniform weights this is power-of-two-choices: probe two hosts at
//! random and take the one with fewer outstanding requests, which keeps the
//! expected maximum load exponentially closer to the mean than a single
//! random probe. With differing weights it switches to weight-sticky random:
//! pick a host at random and keep returning it for `weight` consecutive
//! selections. Stickiness is acceptable for short requests and degrades on
//! long ones; a full-scan algorithm would be needed there.

use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::host::{CallbackHandle, Host, PrioritySet};
use crate::rng::RandomGenerator;
use crate::runtime::{RuntimeLoader, DEFAULT_WEIGHT_ENABLED, WEIGHT_ENABLED};
use crate::stats::ClusterStats;

use super::{LoadBalancer, LoadBalancerBase, RequestContext};

#[derive(Default)]
struct StickyState {
    last_host: Option<Arc<Host>>,
    hits_left: u32,
}

pub struct LeastRequestLoadBalancer {
    base: LoadBalancerBase,
    sticky: Arc<Mutex<StickyState>>,
    // Any membership change invalidates stickiness, even when the sticky
    // host survived the change.
    _membership_cb: CallbackHandle,
}

impl LeastRequestLoadBalancer {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: Arc<ClusterStats>,
        runtime: Arc<dyn RuntimeLoader>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        let sticky = Arc::new(Mutex::new(StickyState::default()));
        let membership_cb = {
            let sticky = sticky.clone();
            priority_set.add_member_update_cb(Box::new(move |_, _, _| {
                let mut sticky = sticky.lock().unwrap();
                sticky.last_host = None;
                sticky.hits_left = 0;
            }))
        };

        Self {
            base: LoadBalancerBase::new(priority_set, local_priority_set, stats, runtime, random),
            sticky,
            _membership_cb: membership_cb,
        }
    }

    /// Two-choice probe. The draws are independent; a collision is used
    /// as-is and merely degrades to a single sample.
    fn choose_two(&self, hosts: &[Arc<Host>]) -> Arc<Host> {
        if hosts.len() == 1 {
            return hosts[0].clone();
        }

        let first = &hosts[self.base.random_index(hosts.len())];
        let second = &hosts[self.base.random_index(hosts.len())];

        // Ties keep the first draw.
        if second.stats().rq_active.value() < first.stats().rq_active.value() {
            second.clone()
        } else {
            first.clone()
        }
    }
}

impl LoadBalancer for LeastRequestLoadBalancer {
    fn choose_host(&self, _context: Option<&RequestContext>) -> Option<Arc<Host>> {
        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }

        let max_host_weight = self.base.stats().max_host_weight.value();
        let weight_enabled = self
            .base
            .runtime()
            .get_integer(WEIGHT_ENABLED, DEFAULT_WEIGHT_ENABLED)
            != 0;

        if max_host_weight <= 1 || !weight_enabled {
            return Some(self.choose_two(&hosts));
        }

        let mut sticky = self.sticky.lock().unwrap();
        if sticky.hits_left > 0 {
            if let Some(last_host) = sticky.last_host.clone() {
                if hosts.iter().any(|host| Arc::ptr_eq(host, &last_host)) {
                    sticky.hits_left -= 1;
                    return Some(last_host);
                }
            }
        }

        let host = hosts[self.base.random_index(hosts.len())].clone();
        trace!(
            host = host.address(),
            weight = host.weight(),
            "New sticky least-request host"
        );
        sticky.hits_left = host.weight().saturating_sub(1);
        sticky.last_host = Some(host.clone());
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostVector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRandom {
        draws: Mutex<Vec<u64>>,
        next: AtomicUsize,
    }

    impl ScriptedRandom {
        fn new(draws: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                draws: Mutex::new(draws.to_vec()),
                next: AtomicUsize::new(0),
            })
        }

        fn draws_taken(&self) -> usize {
            self.next.load(Ordering::Relaxed)
        }
    }

    impl RandomGenerator for ScriptedRandom {
        fn next_u64(&self) -> u64 {
            let index = self.next.fetch_add(1, Ordering::Relaxed);
            self.draws.lock().unwrap().get(index).copied().unwrap_or(0)
        }
    }

    struct DefaultRuntime;

    impl RuntimeLoader for DefaultRuntime {
        fn get_integer(&self, _key: &str, default: u64) -> u64 {
            default
        }

        fn feature_enabled(&self, _key: &str, default_percent: u64) -> bool {
            default_percent >= 100
        }
    }

    struct Setup {
        balancer: LeastRequestLoadBalancer,
        hosts: HostVector,
        random: Arc<ScriptedRandom>,
        host_set: Arc<crate::host::HostSet>,
    }

    fn setup(weights: &[u32], max_host_weight: u64, draws: &[u64]) -> Setup {
        let priority_set = Arc::new(PrioritySet::new());
        let host_set = priority_set.get_or_create_host_set(0);
        let hosts: HostVector = Arc::new(
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| Arc::new(Host::with_weight(format!("10.0.0.{i}:80"), *w)))
                .collect(),
        );
        host_set.update_hosts(hosts.clone(), hosts.clone(), Arc::new(Vec::new()), &[], &[]);

        let stats = Arc::new(ClusterStats::default());
        stats.max_host_weight.set(max_host_weight);

        let random = ScriptedRandom::new(draws);
        let balancer = LeastRequestLoadBalancer::new(
            priority_set,
            None,
            stats,
            Arc::new(DefaultRuntime),
            random.clone(),
        );
        Setup {
            balancer,
            hosts,
            random,
            host_set,
        }
    }

    #[test]
    fn test_single_host_consumes_no_draws() {
        let s = setup(&[1], 1, &[]);
        let chosen = s.balancer.choose_host(None).unwrap();
        assert!(Arc::ptr_eq(&chosen, &s.hosts[0]));
        assert_eq!(s.random.draws_taken(), 0);
    }

    #[test]
    fn test_two_choice_prefers_fewer_active_requests() {
        let s = setup(&[1, 1], 1, &[2, 3, 2, 3]);

        s.hosts[0].stats().rq_active.set(1);
        s.hosts[1].stats().rq_active.set(2);
        // Draws (2, 3) probe hosts (0, 1); host 0 has fewer outstanding.
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[0]));

        s.hosts[0].stats().rq_active.set(2);
        s.hosts[1].stats().rq_active.set(1);
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));
    }

    #[test]
    fn test_two_choice_tie_keeps_first_draw() {
        let s = setup(&[1, 1], 1, &[3, 2]);
        // Both hosts idle; the first draw probes host 1.
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));
    }

    #[test]
    fn test_two_choice_collision_degrades_to_single_sample() {
        let s = setup(&[1, 1], 1, &[2, 2]);
        s.hosts[0].stats().rq_active.set(9);
        // Both draws land on host 0; no resample happens.
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[0]));
        assert_eq!(s.random.draws_taken(), 2);
    }

    #[test]
    fn test_weight_sticky_run_length() {
        let s = setup(&[1, 3], 3, &[1, 2]);

        // Draw 1 picks the weight-3 host; it repeats for two more calls
        // without touching the generator.
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));
        assert_eq!(s.random.draws_taken(), 1);

        // Run exhausted: a new draw (2 % 2 = 0) picks the weight-1 host.
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[0]));
        assert_eq!(s.random.draws_taken(), 2);
    }

    #[test]
    fn test_membership_change_clears_stickiness() {
        let s = setup(&[1, 3], 3, &[1, 1]);
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[1]));

        // Remove the sticky host and notify; the next call re-draws even
        // though two sticky hits were left. Draw 1 % 1 = 0 picks the
        // remaining host.
        let remaining: HostVector = Arc::new(vec![s.hosts[0].clone()]);
        s.host_set.update_hosts(
            remaining.clone(),
            remaining,
            Arc::new(Vec::new()),
            &[],
            &[s.hosts[1].clone()],
        );
        assert!(Arc::ptr_eq(&s.balancer.choose_host(None).unwrap(), &s.hosts[0]));
        assert_eq!(s.random.draws_taken(), 2);
    }

    #[test]
    fn test_weight_disabled_forces_two_choice() {
        struct WeightOffRuntime;
        impl RuntimeLoader for WeightOffRuntime {
            fn get_integer(&self, key: &str, default: u64) -> u64 {
                if key == WEIGHT_ENABLED {
                    0
                } else {
                    default
                }
            }
            fn feature_enabled(&self, _key: &str, default_percent: u64) -> bool {
                default_percent >= 100
            }
        }

        let priority_set = Arc::new(PrioritySet::new());
        let host_set = priority_set.get_or_create_host_set(0);
        let hosts: HostVector = Arc::new(vec![
            Arc::new(Host::with_weight("10.0.0.0:80", 1)),
            Arc::new(Host::with_weight("10.0.0.1:80", 3)),
        ]);
        host_set.update_hosts(hosts.clone(), hosts.clone(), Arc::new(Vec::new()), &[], &[]);

        let stats = Arc::new(ClusterStats::default());
        stats.max_host_weight.set(3);

        let random = ScriptedRandom::new(&[0, 1, 1, 0]);
        let balancer = LeastRequestLoadBalancer::new(
            priority_set,
            None,
            stats,
            Arc::new(WeightOffRuntime),
            random.clone(),
        );

        hosts[0].stats().rq_active.set(1);
        hosts[1].stats().rq_active.set(2);

        // Weights differ, but the runtime kill switch keeps selection in
        // two-choice mode: both probe orders land on the less-loaded host.
        assert!(Arc::ptr_eq(&balancer.choose_host(None).unwrap(), &hosts[0]));
        assert!(Arc::ptr_eq(&balancer.choose_host(None).unwrap(), &hosts[0]));
        assert_eq!(random.draws_taken(), 4);
    }
}
