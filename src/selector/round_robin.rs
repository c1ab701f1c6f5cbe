//! Round-robin cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selector.
/// Serves the cursor value, then advances it with an atomic increment-and-wrap,
/// so concurrent callers each observe a distinct position.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index in `[0, len)`, or `None` for an empty set.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let prev = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c % len + 1) % len))
            .unwrap_or_else(|c| c);
        Some(prev % len)
    }

    /// Reduce the cursor modulo a new set length.
    pub fn normalize(&self, len: usize) {
        if len == 0 {
            self.cursor.store(0, Ordering::Release);
            return;
        }
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c % len));
    }

    /// Current cursor value.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}
