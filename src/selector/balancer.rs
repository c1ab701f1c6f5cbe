//! Mode dispatch over the four selection algorithms.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::selector::error::SelectError;
use crate::selector::jump_hash::{default_hash_fn, HashFn};
use crate::selector::mode::SelectMode;
use crate::selector::random::RandomSelect;
use crate::selector::round_robin::RoundRobin;
use crate::selector::server_set::ServerSet;
use crate::selector::weighted::next_weighted;

/// Picks an index into a `ServerSet` according to the active mode.
pub struct Balancer {
    mode: AtomicU8,
    random: RandomSelect,
    round_robin: RoundRobin,
    hash_fn: RwLock<HashFn>,
}

impl Balancer {
    pub fn new(mode: SelectMode) -> Self {
        Self::with_random(mode, RandomSelect::new())
    }

    pub fn with_random(mode: SelectMode, random: RandomSelect) -> Self {
        Self {
            mode: AtomicU8::new(mode as u8),
            random,
            round_robin: RoundRobin::new(),
            hash_fn: RwLock::new(default_hash_fn()),
        }
    }

    pub fn mode(&self) -> Result<SelectMode, SelectError> {
        SelectMode::try_from(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: SelectMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn set_hash_fn(&self, hash_fn: HashFn) {
        *self.hash_fn.write().unwrap_or_else(PoisonError::into_inner) = hash_fn;
    }

    /// Index of the peer to use for this call.
    ///
    /// `key` is only consulted in consistent-hash mode.
    pub fn pick(&self, set: &ServerSet, key: &[&str]) -> Result<usize, SelectError> {
        let len = set.len();
        if len == 0 {
            return Err(SelectError::NoAvailableService);
        }

        let index = match self.mode()? {
            SelectMode::RandomSelect => self.random.next_index(len),
            SelectMode::RoundRobin => self.round_robin.next_index(len),
            SelectMode::ConsistentHash => {
                let hash_fn = self.hash_fn.read().unwrap_or_else(PoisonError::into_inner).clone();
                Some(hash_fn(len, key) % len)
            }
            SelectMode::WeightedRoundRobin => set.with_weighted(next_weighted),
        };

        index.ok_or(SelectError::NoAvailableService)
    }

    /// Called after a new snapshot of `len` peers is published.
    pub fn on_refresh(&self, len: usize) {
        self.round_robin.normalize(len);
    }

    pub fn cursor(&self) -> usize {
        self.round_robin.position()
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("mode", &self.mode())
            .field("cursor", &self.cursor())
            .finish()
    }
}
