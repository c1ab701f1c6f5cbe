//! Immutable peer snapshots.
//!
//! A `ServerSet` pairs the ordered peer list with its index-aligned weighted
//! view. Refreshes build a new set and publish it whole; the only mutable part
//! is the weighted counters, which sit behind their own lock.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::selector::peer::{DiscoveredPeer, Peer};
use crate::selector::weighted::WeightedPeer;

/// Ordered peers plus their weighted view.
#[derive(Debug)]
pub struct ServerSet {
    peers: Vec<Peer>,
    weighted: Mutex<Vec<WeightedPeer>>,
}

impl ServerSet {
    pub fn empty() -> Self {
        Self::from_peers(Vec::new())
    }

    /// Snapshot of a static list, weighted by each peer's own weight.
    pub fn from_peers(peers: Vec<Peer>) -> Self {
        let weighted = peers.iter().map(|p| WeightedPeer::new(p.weight)).collect();
        Self {
            peers,
            weighted: Mutex::new(weighted),
        }
    }

    /// Snapshot of a registry listing with inactive entries removed.
    pub fn from_discovered(entries: Vec<DiscoveredPeer>) -> Self {
        let mut peers = Vec::with_capacity(entries.len());
        let mut weighted = Vec::with_capacity(entries.len());
        let mut inactive = Vec::new();

        for (i, entry) in entries.into_iter().enumerate() {
            if !entry.metadata.active {
                inactive.push(i);
            }
            weighted.push(WeightedPeer::new(entry.metadata.weight));
            peers.push(entry.peer);
        }

        remove_inactive(&mut peers, &mut weighted, &inactive);

        Self {
            peers,
            weighted: Mutex::new(weighted),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn get(&self, index: usize) -> Option<&Peer> {
        self.peers.get(index)
    }

    /// Copy running counters from `previous` for peers present in both sets.
    ///
    /// Keeps smooth weighted round robin on course across refreshes that
    /// republish the same peers.
    pub fn carry_counters(&self, previous: &ServerSet) {
        if self.is_empty() || previous.is_empty() {
            return;
        }

        let counters: HashMap<&Peer, i64> = previous.with_weighted(|old| {
            previous
                .peers
                .iter()
                .zip(old.iter())
                .map(|(peer, w)| (peer, w.current_weight))
                .collect()
        });

        self.with_weighted(|weighted| {
            for (peer, w) in self.peers.iter().zip(weighted.iter_mut()) {
                if let Some(current) = counters.get(peer) {
                    w.current_weight = *current;
                }
            }
        });
    }

    /// Run `f` with exclusive access to the weighted view.
    pub fn with_weighted<R>(&self, f: impl FnOnce(&mut [WeightedPeer]) -> R) -> R {
        let mut weighted = self.weighted.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut weighted)
    }
}

impl Default for ServerSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Remove the ascending `indices` from both lists, last index first.
pub(crate) fn remove_inactive<T, U>(peers: &mut Vec<T>, weighted: &mut Vec<U>, indices: &[usize]) {
    for &k in indices.iter().rev() {
        if k < peers.len() && k < weighted.len() {
            peers.remove(k);
            weighted.remove(k);
        }
    }
}
