//! Peer addressing and discovery metadata.
//!
//! Discovery registries store peers as `network@address` keys, optionally with
//! a query-string metadata blob such as `weight=3&state=active`.

use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// One addressable backend server instance.
///
/// Identity is `(network, address)`; the weight is carried along but does not
/// take part in equality.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Peer {
    /// Transport kind, e.g. `tcp`, `tcp4`, `tcp6`.
    #[serde(default = "default_network")]
    pub network: String,

    /// Address understood by the connection factory, e.g. `127.0.0.1:8972`.
    pub address: String,

    /// Static weight for weighted round robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_network() -> String {
    "tcp".to_string()
}

fn default_weight() -> u32 {
    1
}

impl Peer {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Parse a `network@address` registry key.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (network, address) = key.trim().split_once('@')?;
        if network.is_empty() || address.is_empty() {
            return None;
        }
        Some(Self::new(network, address))
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network && self.address == other.address
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.network, self.address)
    }
}

/// Metadata attached to a discovery entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub weight: u32,
    pub active: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            active: true,
        }
    }
}

impl Metadata {
    /// Parse a query-string metadata blob.
    ///
    /// Unknown keys are ignored. A `weight` that is not a positive integer
    /// leaves the default in place. A `state` other than `active` marks the
    /// entry inactive. The first occurrence of a key wins.
    pub fn parse(raw: &str) -> Self {
        let mut meta = Self::default();
        let mut seen_weight = false;
        let mut seen_state = false;

        for (key, value) in url::form_urlencoded::parse(raw.trim().as_bytes()) {
            match key.as_ref() {
                "weight" if !seen_weight => {
                    seen_weight = true;
                    if let Ok(weight) = value.trim().parse::<u32>() {
                        if weight > 0 {
                            meta.weight = weight;
                        }
                    }
                }
                "state" if !seen_state => {
                    seen_state = true;
                    meta.active = value.is_empty() || value == "active";
                }
                _ => {}
            }
        }
        meta
    }
}

/// A peer as listed by a registry, before inactive filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub peer: Peer,
    pub metadata: Metadata,
}

impl DiscoveredPeer {
    /// Build an entry from a registry key and its metadata blob.
    ///
    /// Returns `None` for keys that are not in `network@address` form.
    pub fn from_registry(key: &str, metadata: &str) -> Option<Self> {
        let metadata = Metadata::parse(metadata);
        let peer = Peer::parse_key(key)?.with_weight(metadata.weight);
        Some(Self { peer, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_splits_network() {
        let peer = Peer::parse_key("tcp@127.0.0.1:8972").unwrap();
        assert_eq!(peer.network, "tcp");
        assert_eq!(peer.address, "127.0.0.1:8972");
        assert_eq!(peer.weight, 1);
        assert_eq!(peer.to_string(), "tcp@127.0.0.1:8972");

        assert!(Peer::parse_key("127.0.0.1:8972").is_none());
        assert!(Peer::parse_key("@127.0.0.1:8972").is_none());
    }

    #[test]
    fn identity_ignores_weight() {
        let a = Peer::new("tcp", "10.0.0.1:80").with_weight(5);
        let b = Peer::new("tcp", "10.0.0.1:80");
        assert_eq!(a, b);
        assert_ne!(a, Peer::new("tcp6", "10.0.0.1:80"));
    }

    #[test]
    fn metadata_applies_valid_weight() {
        let meta = Metadata::parse("weight=7&state=active");
        assert_eq!(meta.weight, 7);
        assert!(meta.active);
    }

    #[test]
    fn metadata_ignores_malformed_weight() {
        assert_eq!(Metadata::parse("weight=heavy").weight, 1);
        assert_eq!(Metadata::parse("weight=-2").weight, 1);
        assert_eq!(Metadata::parse("weight=0").weight, 1);
        assert_eq!(Metadata::parse("").weight, 1);
    }

    #[test]
    fn metadata_state() {
        assert!(Metadata::parse("").active);
        assert!(Metadata::parse("weight=2").active);
        assert!(Metadata::parse("state=").active);
        assert!(!Metadata::parse("state=inactive").active);
        assert!(!Metadata::parse("state=down&weight=3").active);
    }

    #[test]
    fn discovered_peer_carries_weight() {
        let entry = DiscoveredPeer::from_registry("tcp@10.0.0.2:9000", "weight=4").unwrap();
        assert_eq!(entry.peer.weight, 4);
        assert!(entry.metadata.active);
        assert!(DiscoveredPeer::from_registry("garbage", "weight=4").is_none());
    }
}
