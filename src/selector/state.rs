//! Published peer snapshot plus the balancer reading it.

use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;

use crate::observability::metrics;
use crate::selector::balancer::Balancer;
use crate::selector::error::SelectError;
use crate::selector::jump_hash::HashFn;
use crate::selector::mode::SelectMode;
use crate::selector::peer::Peer;
use crate::selector::server_set::ServerSet;

/// State shared between a selector's callers and its refresh task.
///
/// Refreshes replace the whole `ServerSet` with one atomic store; callers load
/// the snapshot once per pick, so they never see peers and weights from
/// different generations.
#[derive(Debug)]
pub struct SelectorState {
    backend: &'static str,
    snapshot: ArcSwap<ServerSet>,
    balancer: Balancer,
    dial_timeout: Duration,
}

impl SelectorState {
    pub fn new(backend: &'static str, mode: SelectMode, dial_timeout: Duration) -> Self {
        Self::with_balancer(backend, Balancer::new(mode), dial_timeout)
    }

    pub fn with_balancer(backend: &'static str, balancer: Balancer, dial_timeout: Duration) -> Self {
        Self {
            backend,
            snapshot: ArcSwap::from_pointee(ServerSet::empty()),
            balancer,
            dial_timeout,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ServerSet> {
        self.snapshot.load_full()
    }

    /// Replace the snapshot and renormalize the round-robin cursor.
    ///
    /// Weighted counters of peers that survive the refresh are carried over.
    pub fn publish(&self, set: ServerSet) {
        let len = set.len();
        set.carry_counters(&self.snapshot.load());
        let previous = self.snapshot.swap(Arc::new(set));
        self.balancer.on_refresh(len);
        metrics::record_peer_count(self.backend, len);

        if previous.len() != len {
            tracing::info!(backend = self.backend, previous = previous.len(), current = len, "Peer set changed size");
        } else {
            tracing::debug!(backend = self.backend, peers = len, "Peer set refreshed");
        }
    }

    /// Pick a peer from the current snapshot.
    pub fn pick(&self, key: &[&str]) -> Result<Peer, SelectError> {
        let set = self.snapshot.load();
        let result = self
            .balancer
            .pick(&set, key)
            .and_then(|index| set.get(index).cloned().ok_or(SelectError::NoAvailableService));

        let mode = self.balancer.mode().map(|m| m.as_str()).unwrap_or("unknown");
        match &result {
            Ok(_) => metrics::record_selection(self.backend, mode, "ok"),
            Err(SelectError::NoAvailableService) => metrics::record_selection(self.backend, mode, "no_peer"),
            Err(_) => metrics::record_selection(self.backend, mode, "error"),
        }
        result
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.snapshot.load().peers().to_vec()
    }

    pub fn select_mode(&self) -> SelectMode {
        self.balancer.mode().unwrap_or_default()
    }

    pub fn set_select_mode(&self, mode: SelectMode) {
        tracing::info!(backend = self.backend, mode = %mode, "Select mode changed");
        self.balancer.set_mode(mode);
    }

    pub fn set_hash_fn(&self, hash_fn: HashFn) {
        self.balancer.set_hash_fn(hash_fn);
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    pub fn cursor(&self) -> usize {
        self.balancer.cursor()
    }
}
