//! Fixed peer-list selector.

use std::time::Duration;

use crate::selector::balancer::Balancer;
use crate::selector::error::SelectError;
use crate::selector::jump_hash::HashFn;
use crate::selector::mode::SelectMode;
use crate::selector::peer::Peer;
use crate::selector::random::RandomSelect;
use crate::selector::server_set::ServerSet;
use crate::selector::state::SelectorState;
use crate::selector::Selector;

/// Selects among a caller-supplied, ordered list of peers.
///
/// The weighted view is built once here from each peer's weight; nothing is
/// ever refreshed.
#[derive(Debug)]
pub struct StaticSelector {
    state: SelectorState,
}

impl StaticSelector {
    pub fn new(peers: Vec<Peer>, mode: SelectMode, dial_timeout: Duration) -> Self {
        Self::with_balancer(peers, Balancer::new(mode), dial_timeout)
    }

    /// Like `new`, with a fixed random seed.
    pub fn with_seed(peers: Vec<Peer>, mode: SelectMode, dial_timeout: Duration, seed: u64) -> Self {
        Self::with_balancer(peers, Balancer::with_random(mode, RandomSelect::with_seed(seed)), dial_timeout)
    }

    fn with_balancer(peers: Vec<Peer>, balancer: Balancer, dial_timeout: Duration) -> Self {
        let state = SelectorState::with_balancer("static", balancer, dial_timeout);
        state.publish(ServerSet::from_peers(peers));
        Self { state }
    }
}

impl Selector for StaticSelector {
    fn name(&self) -> &'static str {
        self.state.backend()
    }

    fn pick(&self, key: &[&str]) -> Result<Peer, SelectError> {
        self.state.pick(key)
    }

    fn peers(&self) -> Vec<Peer> {
        self.state.peers()
    }

    fn select_mode(&self) -> SelectMode {
        self.state.select_mode()
    }

    fn set_select_mode(&self, mode: SelectMode) {
        self.state.set_select_mode(mode);
    }

    fn set_hash_fn(&self, hash_fn: HashFn) {
        self.state.set_hash_fn(hash_fn);
    }

    fn dial_timeout(&self) -> Duration {
        self.state.dial_timeout()
    }
}
