//! Client-side peer selection for RPC calls.
//!
//! A selector keeps a cached set of peers, from a fixed list or a discovery
//! registry (Consul, etcd, ZooKeeper), and picks one per call with a random,
//! round-robin, consistent-hash or smooth weighted round-robin algorithm.

pub mod config;
pub mod net;
pub mod selector;

pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::SelectorConfig;
pub use lifecycle::Shutdown;
pub use selector::{Peer, SelectError, SelectMode, Selector, SelectorExt};
