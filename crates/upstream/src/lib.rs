//! Vigil Upstream Selection Engine
//!
//! The host-selection core of the Vigil proxy data plane: given a
//! priority-ordered, dynamically changing view of a cluster, pick one backend
//! host per request while respecting health, priority failover, and locality
//! affinity.
//!
//! This library provides:
//!
//! - **Membership model**: hosts, per-priority host sets, and priority sets
//!   with change subscriptions
//! - **Selection substrate**: panic mode, gentle priority failover, and
//!   locality-aware routing shared by every policy
//! - **Policies**: round-robin, weighted least-request, and random
//! - **Subset configuration**: a read-only snapshot of metadata-key
//!   partitioning for the subset balancer layered above
//!
//! Every operation runs synchronously to completion and is allocation-free on
//! the steady-state request path; host lists are handed out as shared
//! snapshots.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vigil_upstream::balancer::{LoadBalancer, RoundRobinLoadBalancer};
//! use vigil_upstream::host::{Host, PrioritySet};
//! use vigil_upstream::rng::SystemRandom;
//! use vigil_upstream::runtime::StaticRuntime;
//! use vigil_upstream::stats::ClusterStats;
//!
//! let priority_set = Arc::new(PrioritySet::new());
//! let host_set = priority_set.get_or_create_host_set(0);
//! let hosts = Arc::new(vec![Arc::new(Host::new("10.0.0.1:80"))]);
//! host_set.update_hosts(hosts.clone(), hosts, Arc::new(Vec::new()), &[], &[]);
//!
//! let random = Arc::new(SystemRandom);
//! let balancer = RoundRobinLoadBalancer::new(
//!     priority_set,
//!     None,
//!     Arc::new(ClusterStats::default()),
//!     Arc::new(StaticRuntime::new(random.clone())),
//!     random,
//! );
//! assert_eq!(balancer.choose_host(None).unwrap().address(), "10.0.0.1:80");
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod balancer;
pub mod config;
pub mod host;
pub mod rng;
pub mod runtime;
pub mod stats;
pub mod subset;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Selection policies and substrate
pub use balancer::{
    create_load_balancer, is_global_panic, LeastRequestLoadBalancer, LoadBalancer,
    LocalityRoutingState, RandomLoadBalancer, RequestContext, RoundRobinLoadBalancer,
};

// Membership model
pub use host::{Host, HostSet, HostStats, HostVector, HostsPerLocality, PrioritySet};

// Subset configuration
pub use config::{LbSubsetConfig, SubsetFallbackPolicy, SubsetSelector};
pub use subset::SubsetInfo;

// Seams
pub use rng::{RandomGenerator, SystemRandom};
pub use runtime::{RuntimeLoader, StaticRuntime};

// Stats
pub use stats::ClusterStats;

// Re-export common types for convenience
pub use vigil_common::{LoadBalancingAlgorithm, VigilError, VigilResult};
