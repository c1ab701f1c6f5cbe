//! Peer selection subsystem.
//!
//! # Data Flow
//! ```text
//! Construction:
//!     config → backend (static | consul | etcd | zookeeper)
//!         → initial pull → ServerSet snapshot (peers + weighted view)
//!         → refresh.rs task (poll timer or registry watch)
//!
//! Every call:
//!     SelectorExt::select(factory, key)
//!         → state.rs loads the current snapshot once
//!         → balancer.rs dispatches on SelectMode:
//!             - random.rs (seeded uniform index)
//!             - round_robin.rs (atomic increment-and-wrap cursor)
//!             - jump_hash.rs (key material → bucket)
//!             - weighted.rs (smooth weighted round robin)
//!         → ConnectionFactory::open(network, address, dial_timeout)
//! ```
//!
//! # Design Decisions
//! - Selection never touches the registry; it reads the last snapshot
//! - A refresh publishes peers and weights together with one pointer swap
//! - Refresh failures keep the previous snapshot
//! - Each backend is an independent type; they share only the snapshot and
//!   balancer building blocks

pub mod balancer;
pub mod consul;
pub mod error;
pub mod etcd;
pub mod jump_hash;
pub mod mode;
pub mod peer;
pub mod random;
pub mod refresh;
pub mod round_robin;
pub mod server_set;
pub mod state;
pub mod static_list;
pub mod weighted;
pub mod zookeeper;

use std::time::Duration;
use async_trait::async_trait;
use url::Url;

use crate::config::{DiscoveryConfig, SelectorConfig};
use crate::net::ConnectionFactory;

pub use consul::ConsulSelector;
pub use error::{RegistryError, RegistryResult, SelectError, SelectResult};
pub use etcd::EtcdSelector;
pub use jump_hash::{default_hash_fn, jump_consistent_hash, HashFn};
pub use mode::SelectMode;
pub use peer::{DiscoveredPeer, Metadata, Peer};
pub use server_set::ServerSet;
pub use static_list::StaticSelector;
pub use zookeeper::ZooKeeperSelector;

/// A source of peers for outgoing calls.
pub trait Selector: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Pick one peer from the cached set.
    ///
    /// `key` is the consistent-hash key material (service method, arguments)
    /// and is ignored by the other modes.
    fn pick(&self, key: &[&str]) -> Result<Peer, SelectError>;

    /// Peers in the current snapshot, in listing order.
    fn peers(&self) -> Vec<Peer>;

    fn select_mode(&self) -> SelectMode;

    /// Switch algorithms without touching the peer cache.
    fn set_select_mode(&self, mode: SelectMode);

    /// Replace the consistent-hash function.
    fn set_hash_fn(&self, hash_fn: HashFn);

    fn dial_timeout(&self) -> Duration;

    /// Stop background refresh. The cached set stays readable.
    fn shutdown(&self) {}
}

/// Connection-opening operations available on every selector.
#[async_trait]
pub trait SelectorExt: Selector {
    /// Pick a peer and open a connection to it.
    async fn select<F>(&self, factory: &F, key: &[&str]) -> Result<F::Connection, SelectError>
    where
        F: ConnectionFactory + ?Sized;

    /// Open a connection to every cached peer. Peers that fail are skipped,
    /// so the result may be shorter than the peer list.
    async fn all_connections<F>(&self, factory: &F) -> Vec<F::Connection>
    where
        F: ConnectionFactory + ?Sized;
}

#[async_trait]
impl<S: Selector + ?Sized> SelectorExt for S {
    async fn select<F>(&self, factory: &F, key: &[&str]) -> Result<F::Connection, SelectError>
    where
        F: ConnectionFactory + ?Sized,
    {
        let peer = self.pick(key)?;
        match factory.open(&peer.network, &peer.address, self.dial_timeout()).await {
            Ok(conn) => Ok(conn),
            Err(source) => {
                tracing::debug!(backend = self.name(), peer = %peer, error = %source, "Connection to selected peer failed");
                Err(SelectError::Connection {
                    network: peer.network,
                    address: peer.address,
                    source,
                })
            }
        }
    }

    async fn all_connections<F>(&self, factory: &F) -> Vec<F::Connection>
    where
        F: ConnectionFactory + ?Sized,
    {
        let peers = self.peers();
        let mut connections = Vec::with_capacity(peers.len());
        for peer in peers {
            match factory.open(&peer.network, &peer.address, self.dial_timeout()).await {
                Ok(conn) => connections.push(conn),
                Err(e) => tracing::debug!(backend = self.name(), peer = %peer, error = %e, "Skipping unreachable peer"),
            }
        }
        connections
    }
}

/// Build the selector described by `config`.
pub async fn build(config: &SelectorConfig) -> Result<Box<dyn Selector>, RegistryError> {
    let mode = config.select_mode;
    let dial_timeout = config.dial_timeout();

    let selector: Box<dyn Selector> = match &config.discovery {
        DiscoveryConfig::Static(c) => Box::new(StaticSelector::new(c.peers.clone(), mode, dial_timeout)),
        DiscoveryConfig::Consul(c) => Box::new(ConsulSelector::connect(c.clone(), mode, dial_timeout).await?),
        DiscoveryConfig::Etcd(c) => Box::new(EtcdSelector::connect(c.clone(), mode, dial_timeout).await?),
        DiscoveryConfig::ZooKeeper(c) => Box::new(ZooKeeperSelector::connect(c.clone(), mode, dial_timeout).await?),
    };

    tracing::info!(
        backend = selector.name(),
        mode = %selector.select_mode(),
        peers = selector.peers().len(),
        "Selector ready"
    );
    Ok(selector)
}

/// Parse an HTTP registry address, defaulting the scheme to `http`, with a
/// trailing slash so relative API paths join underneath it.
pub(crate) fn registry_base_url(address: &str) -> Result<Url, RegistryError> {
    let address = address.trim();
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| RegistryError::InvalidPath(format!("{}: {}", address, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
