//! Smooth weighted round robin.
//!
//! Each pick adds every peer's effective weight to its current weight, chooses
//! the highest current weight, then subtracts the total effective weight from
//! the winner. Heavy peers are interleaved with light ones instead of being
//! picked in bursts.

/// Weighted view of one peer, index-aligned with its server set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedPeer {
    /// Configured weight.
    pub weight: i64,
    /// Weight used by the algorithm; starts equal to `weight`.
    pub effective_weight: i64,
    /// Running counter.
    pub current_weight: i64,
}

impl WeightedPeer {
    pub fn new(weight: u32) -> Self {
        let weight = i64::from(weight);
        Self {
            weight,
            effective_weight: weight,
            current_weight: 0,
        }
    }
}

/// Pick the next peer; returns its index, or `None` when `peers` is empty.
///
/// Ties go to the lowest index.
pub fn next_weighted(peers: &mut [WeightedPeer]) -> Option<usize> {
    let mut total = 0i64;
    let mut best: Option<usize> = None;

    for i in 0..peers.len() {
        peers[i].current_weight += peers[i].effective_weight;
        total += peers[i].effective_weight;

        match best {
            Some(b) if peers[b].current_weight >= peers[i].current_weight => {}
            _ => best = Some(i),
        }
    }

    let best = best?;
    peers[best].current_weight -= total;
    Some(best)
}
