//! Uniform random selection.

use std::sync::{Mutex, PoisonError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random selector backed by a generator seeded once at construction.
#[derive(Debug)]
pub struct RandomSelect {
    rng: Mutex<StdRng>,
}

impl RandomSelect {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, mostly for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform index in `[0, len)`, or `None` for an empty set.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Some(rng.gen_range(0..len))
    }
}

impl Default for RandomSelect {
    fn default() -> Self {
        Self::new()
    }
}
