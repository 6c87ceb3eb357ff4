//! Locality-aware routing.
//!
//! When a local view of peer proxies exists, selection is biased toward the
//! caller's own locality: either every request goes there (the local locality
//! has at least its fair share of upstream capacity), or requests are split
//! between the local locality and remote localities proportionally to the
//! capacity each remote locality has left after local traffic claims its
//! pro-rata share.
//!
//! The routing decision is precomputed per priority on every membership
//! change; the per-request work is one or two random draws and a prefix-sum
//! lookup. Percentages are integers scaled by 10000 (two decimal digits);
//! switching to floating point changes observable routing at boundary
//! configurations.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::host::{HostSet, HostVector, PrioritySet};
use crate::runtime::{
    RuntimeLoader, DEFAULT_ZONE_ROUTING_ENABLED, DEFAULT_ZONE_ROUTING_MIN_CLUSTER_SIZE,
    ZONE_ROUTING_ENABLED, ZONE_ROUTING_MIN_CLUSTER_SIZE,
};
use crate::stats::ClusterStats;

use super::{is_global_panic, LoadBalancerBase};

/// Scale factor for locality percentages: 10000 = 100.00%.
const PERCENT_SCALE: u64 = 10000;

/// How selection treats localities at one priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalityRoutingState {
    /// Locality based routing is off.
    #[default]
    NoLocalityRouting,
    /// All requests can be routed to the local locality.
    LocalityDirect,
    /// The local locality cannot absorb the anticipated load; residual load
    /// is spread across the remote localities.
    LocalityResidual,
}

/// Precomputed routing decision for one priority level.
#[derive(Debug, Default)]
pub(crate) struct PerPriorityState {
    pub routing_state: LocalityRoutingState,
    /// Share of requests (scaled by 10000) routed locally when residual.
    pub local_percent_to_route: u64,
    /// Cumulative residual capacity of remote localities; entry `i` covers
    /// locality `i + 1`, the last entry is the total.
    pub residual_capacity: Vec<u64>,
}

/// Share of hosts in each locality, scaled by 10000, truncating.
pub(crate) fn calculate_locality_percentage(hosts_per_locality: &[HostVector]) -> Vec<u64> {
    let total: u64 = hosts_per_locality
        .iter()
        .map(|locality| locality.len() as u64)
        .sum();
    hosts_per_locality
        .iter()
        .map(|locality| {
            if total == 0 {
                0
            } else {
                PERCENT_SCALE * locality.len() as u64 / total
            }
        })
        .collect()
}

/// Cheap structural checks that rule locality routing out for a priority.
/// Returns the local host set when routing is possible.
fn locality_routing_preconditions(
    host_set: &HostSet,
    local_priority_set: Option<&PrioritySet>,
    runtime: &dyn RuntimeLoader,
    stats: &ClusterStats,
) -> Option<Arc<HostSet>> {
    let local_priority_set = local_priority_set?;

    if host_set.healthy_hosts_per_locality().len() < 2 {
        return None;
    }

    // Also re-checked on every request; the structural check spares the
    // recomputation when the gate is parked off.
    if !runtime.feature_enabled(ZONE_ROUTING_ENABLED, DEFAULT_ZONE_ROUTING_ENABLED) {
        return None;
    }

    if is_global_panic(host_set, runtime) {
        return None;
    }

    let min_cluster_size = runtime.get_integer(
        ZONE_ROUTING_MIN_CLUSTER_SIZE,
        DEFAULT_ZONE_ROUTING_MIN_CLUSTER_SIZE,
    );
    if (host_set.healthy_hosts().len() as u64) < min_cluster_size {
        stats.lb_zone_cluster_too_small.inc();
        return None;
    }

    // A local priority set without a priority-0 host set reads as zero
    // localities here.
    let Some(local_host_set) = local_priority_set.host_set(0) else {
        stats.lb_zone_number_differs.inc();
        return None;
    };
    if host_set.healthy_hosts_per_locality().len()
        != local_host_set.healthy_hosts_per_locality().len()
    {
        stats.lb_zone_number_differs.inc();
        return None;
    }

    if local_host_set.hosts().is_empty() || is_global_panic(&local_host_set, runtime) {
        stats.lb_local_cluster_not_ok.inc();
        return None;
    }

    Some(local_host_set)
}

/// Rebuild the locality routing decision for one priority level.
pub(crate) fn regenerate_locality_routing_structures(
    host_set: &HostSet,
    local_priority_set: Option<&PrioritySet>,
    runtime: &dyn RuntimeLoader,
    stats: &ClusterStats,
) -> PerPriorityState {
    let Some(local_host_set) =
        locality_routing_preconditions(host_set, local_priority_set, runtime, stats)
    else {
        return PerPriorityState::default();
    };

    let upstream_per_locality = host_set.healthy_hosts_per_locality();
    let local_per_locality = local_host_set.healthy_hosts_per_locality();

    let upstream_percentage = calculate_locality_percentage(&upstream_per_locality);
    let local_percentage = calculate_locality_percentage(&local_per_locality);

    // The upstream cluster has at least our locality's fair share of capacity
    // in our locality: route everything there.
    if upstream_percentage[0] >= local_percentage[0] {
        debug!(
            priority = host_set.priority(),
            upstream_local_pct = upstream_percentage[0],
            local_pct = local_percentage[0],
            "Locality routing direct"
        );
        return PerPriorityState {
            routing_state: LocalityRoutingState::LocalityDirect,
            ..PerPriorityState::default()
        };
    }

    // Only part of the local demand fits locally; the rest is spread over
    // remote localities in proportion to the capacity each has left after
    // local traffic claims its pro-rata share.
    let local_percent_to_route = upstream_percentage[0] * PERCENT_SCALE / local_percentage[0];

    let mut residual_capacity = Vec::with_capacity(upstream_percentage.len() - 1);
    let mut running_total = 0u64;
    for i in 1..upstream_percentage.len() {
        let claimed = local_percentage[i] * upstream_percentage[0] / local_percentage[0];
        running_total += upstream_percentage[i].saturating_sub(claimed);
        residual_capacity.push(running_total);
    }

    debug!(
        priority = host_set.priority(),
        local_percent_to_route,
        total_residual = running_total,
        remote_localities = residual_capacity.len(),
        "Locality routing residual"
    );

    PerPriorityState {
        routing_state: LocalityRoutingState::LocalityResidual,
        local_percent_to_route,
        residual_capacity,
    }
}

impl LoadBalancerBase {
    /// Pick the locality to serve one request from, per the precomputed
    /// state. Falls back to the flat healthy list when the feature gate is
    /// off for this request or no residual capacity remains.
    pub(crate) fn try_choose_local_locality_hosts(
        &self,
        host_set: &HostSet,
        state: &PerPriorityState,
    ) -> HostVector {
        // The gate is per-request: it may have flipped since the routing
        // structures were computed.
        if !self
            .runtime()
            .feature_enabled(ZONE_ROUTING_ENABLED, DEFAULT_ZONE_ROUTING_ENABLED)
        {
            return host_set.healthy_hosts();
        }

        let per_locality = host_set.healthy_hosts_per_locality();

        if state.routing_state == LocalityRoutingState::LocalityDirect {
            self.stats().lb_zone_routing_all_directly.inc();
            return per_locality[0].clone();
        }

        // LocalityResidual: first decide local vs. remote.
        if self.random().next_u64() % PERCENT_SCALE < state.local_percent_to_route {
            self.stats().lb_zone_routing_sampled.inc();
            return per_locality[0].clone();
        }

        let total_residual = state.residual_capacity.last().copied().unwrap_or(0);
        if total_residual == 0 {
            self.stats().lb_zone_no_capacity_left.inc();
            return host_set.healthy_hosts();
        }

        let threshold = self.random().next_u64() % total_residual;
        let bucket = state
            .residual_capacity
            .partition_point(|&capacity| capacity <= threshold);

        trace!(threshold, bucket, "Routing cross-locality");
        self.stats().lb_zone_routing_cross_zone.inc();
        per_locality[bucket + 1].clone()
    }
}
