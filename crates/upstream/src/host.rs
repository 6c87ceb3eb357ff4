//! Host, host-set, and priority-set data model.
//!
//! This is the membership-facing surface of the balancer: the discovery and
//! health-checking subsystem owns host lifecycles and pushes new membership
//! views through [`HostSet::update_hosts`]; balancers subscribe to those
//! updates through [`PrioritySet::add_member_update_cb`] and refresh their
//! derived routing state before the next selection.
//!
//! All host lists are shared as `Arc` snapshots. A balancer that grabbed a
//! [`HostVector`] keeps a consistent view for the duration of one selection
//! even if a membership update lands concurrently; the next selection sees
//! the new view.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::debug;

use vigil_common::Gauge;

/// Shared snapshot of a host list.
pub type HostVector = Arc<Vec<Arc<Host>>>;

/// Shared snapshot of hosts grouped by locality. The first entry is the
/// locality this proxy runs in; the rest are remote.
pub type HostsPerLocality = Arc<Vec<HostVector>>;

/// An empty host list, shared so that degenerate selections allocate nothing.
pub fn empty_host_vector() -> HostVector {
    static EMPTY: OnceLock<HostVector> = OnceLock::new();
    EMPTY.get_or_init(|| Arc::new(Vec::new())).clone()
}

/// Per-host stat handles, written by the request lifecycle and read here.
#[derive(Debug, Default)]
pub struct HostStats {
    /// Requests currently outstanding against this host.
    pub rq_active: Gauge,
}

/// A single upstream backend.
///
/// The membership subsystem owns the set of hosts; the balancer only holds
/// shared references and reads weight, health, and the active-request gauge.
#[derive(Debug)]
pub struct Host {
    address: String,
    weight: u32,
    healthy: AtomicBool,
    stats: HostStats,
}

impl Host {
    /// Create a host with the default weight of 1.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_weight(address, 1)
    }

    pub fn with_weight(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            healthy: AtomicBool::new(true),
            stats: HostStats::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }
}

/// Callback invoked after a host set's membership changed. Receives the
/// priority of the host set that changed plus the added and removed hosts.
pub type MemberUpdateCb = Box<dyn Fn(u32, &[Arc<Host>], &[Arc<Host>]) + Send + Sync>;

/// Subscriber list shared by a priority set and all of its host sets.
pub(crate) struct CallbackList {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, MemberUpdateCb)>>,
}

impl CallbackList {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn add(&self, cb: MemberUpdateCb) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().push((id, cb));
        id
    }

    fn remove(&self, id: u64) {
        self.subscribers.lock().unwrap().retain(|(sub_id, _)| *sub_id != id);
    }

    // The subscriber lock is held for the duration of the dispatch, so
    // callbacks must not register or revoke subscriptions.
    fn run(&self, priority: u32, added: &[Arc<Host>], removed: &[Arc<Host>]) {
        for (_, cb) in self.subscribers.lock().unwrap().iter() {
            cb(priority, added, removed);
        }
    }
}

/// Handle for a membership subscription. Dropping the handle revokes the
/// subscription, so a destroyed balancer is never invoked again.
pub struct CallbackHandle {
    id: u64,
    list: Weak<CallbackList>,
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }
}

/// The hosts at a single priority level.
///
/// Exposes three parallel views: all hosts, the healthy subset, and the
/// healthy subset grouped by locality. The views are replaced wholesale by
/// [`update_hosts`](HostSet::update_hosts); flattening the per-locality view
/// always yields exactly the healthy view.
pub struct HostSet {
    priority: u32,
    hosts: RwLock<HostVector>,
    healthy_hosts: RwLock<HostVector>,
    healthy_hosts_per_locality: RwLock<HostsPerLocality>,
    callbacks: Arc<CallbackList>,
}

impl HostSet {
    fn new(priority: u32, callbacks: Arc<CallbackList>) -> Self {
        Self {
            priority,
            hosts: RwLock::new(empty_host_vector()),
            healthy_hosts: RwLock::new(empty_host_vector()),
            healthy_hosts_per_locality: RwLock::new(Arc::new(Vec::new())),
            callbacks,
        }
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn hosts(&self) -> HostVector {
        self.hosts.read().unwrap().clone()
    }

    pub fn healthy_hosts(&self) -> HostVector {
        self.healthy_hosts.read().unwrap().clone()
    }

    pub fn healthy_hosts_per_locality(&self) -> HostsPerLocality {
        self.healthy_hosts_per_locality.read().unwrap().clone()
    }

    /// Install new membership views and notify subscribers.
    ///
    /// `added` and `removed` describe the delta for subscribers that track
    /// individual hosts; the views themselves are replaced, not patched.
    pub fn update_hosts(
        &self,
        hosts: HostVector,
        healthy_hosts: HostVector,
        healthy_hosts_per_locality: HostsPerLocality,
        added: &[Arc<Host>],
        removed: &[Arc<Host>],
    ) {
        debug!(
            priority = self.priority,
            hosts = hosts.len(),
            healthy = healthy_hosts.len(),
            localities = healthy_hosts_per_locality.len(),
            "Updating host set membership"
        );

        {
            *self.hosts.write().unwrap() = hosts;
            *self.healthy_hosts.write().unwrap() = healthy_hosts;
            *self.healthy_hosts_per_locality.write().unwrap() = healthy_hosts_per_locality;
        }
        self.callbacks.run(self.priority, added, removed);
    }
}

/// Priority-ordered collection of host sets. Priority 0 is the most
/// preferred; indices never shift once created.
pub struct PrioritySet {
    host_sets: RwLock<Vec<Arc<HostSet>>>,
    callbacks: Arc<CallbackList>,
}

impl Default for PrioritySet {
    fn default() -> Self {
        Self::new()
    }
}

impl PrioritySet {
    pub fn new() -> Self {
        Self {
            host_sets: RwLock::new(Vec::new()),
            callbacks: CallbackList::new(),
        }
    }

    /// Get the host set at `priority`, creating it (and any missing lower
    /// priorities) if needed. The set stays dense so priority indices are
    /// stable.
    pub fn get_or_create_host_set(&self, priority: u32) -> Arc<HostSet> {
        let mut host_sets = self.host_sets.write().unwrap();
        while host_sets.len() <= priority as usize {
            let next = host_sets.len() as u32;
            host_sets.push(Arc::new(HostSet::new(next, self.callbacks.clone())));
        }
        host_sets[priority as usize].clone()
    }

    pub fn host_set(&self, priority: u32) -> Option<Arc<HostSet>> {
        self.host_sets.read().unwrap().get(priority as usize).cloned()
    }

    /// Snapshot of all host sets, in priority order.
    pub fn host_sets(&self) -> Vec<Arc<HostSet>> {
        self.host_sets.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.host_sets.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_sets.read().unwrap().is_empty()
    }

    /// Subscribe to membership changes on every existing and future host set
    /// in this priority set. The subscription is revoked when the returned
    /// handle is dropped.
    pub fn add_member_update_cb(&self, cb: MemberUpdateCb) -> CallbackHandle {
        let id = self.callbacks.add(cb);
        CallbackHandle {
            id,
            list: Arc::downgrade(&self.callbacks),
        }
    }
}
