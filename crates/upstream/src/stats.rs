//! Per-cluster balancer statistics.

use vigil_common::{Counter, Gauge};

/// Counters written by the selection engine plus the gauges it reads.
///
/// The membership subsystem maintains `max_host_weight`; everything else is
/// incremented here and scraped by the observability layer.
#[derive(Debug, Default)]
pub struct ClusterStats {
    /// Selections that had to include unhealthy hosts.
    pub lb_healthy_panic: Counter,
    /// Locality routing skipped: healthy cluster below the minimum size.
    pub lb_zone_cluster_too_small: Counter,
    /// Locality routing skipped: local and upstream locality counts differ.
    pub lb_zone_number_differs: Counter,
    /// Locality routing skipped: local cluster empty or in panic.
    pub lb_local_cluster_not_ok: Counter,
    /// Selections routed to the local locality unconditionally.
    pub lb_zone_routing_all_directly: Counter,
    /// Selections routed locally by residual sampling.
    pub lb_zone_routing_sampled: Counter,
    /// Selections routed to a remote locality by residual sampling.
    pub lb_zone_routing_cross_zone: Counter,
    /// Residual sampling found no remote capacity; fell back to flat.
    pub lb_zone_no_capacity_left: Counter,

    /// Largest weight among currently configured hosts.
    pub max_host_weight: Gauge,
}
