//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a selector.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::selector::{Peer, SelectMode};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Initial selection mode.
    pub select_mode: SelectMode,

    /// Dial timeout for connections to selected peers, in milliseconds.
    pub dial_timeout_ms: u64,

    /// Where peers come from.
    pub discovery: DiscoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl SelectorConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            select_mode: SelectMode::RandomSelect,
            dial_timeout_ms: 10_000,
            discovery: DiscoveryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Discovery backend, tagged by `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    Static(StaticConfig),
    Consul(ConsulConfig),
    Etcd(EtcdConfig),
    #[serde(rename = "zookeeper")]
    ZooKeeper(ZooKeeperConfig),
}

impl DiscoveryConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryConfig::Static(_) => "static",
            DiscoveryConfig::Consul(_) => "consul",
            DiscoveryConfig::Etcd(_) => "etcd",
            DiscoveryConfig::ZooKeeper(_) => "zookeeper",
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::Static(StaticConfig::default())
    }
}

/// Fixed peer list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    pub peers: Vec<Peer>,
}

/// Consul agent discovery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsulConfig {
    /// Agent address (e.g., "http://127.0.0.1:8500").
    pub address: String,

    /// Services whose ID starts with this name are peers.
    pub service_name: String,

    /// Poll interval in milliseconds.
    pub refresh_interval_ms: u64,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// ACL token sent as `X-Consul-Token`.
    pub token: Option<String>,

    /// Datacenter to query.
    pub datacenter: Option<String>,
}

impl ConsulConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            service_name: String::new(),
            refresh_interval_ms: 10_000,
            request_timeout_ms: 5_000,
            token: None,
            datacenter: None,
        }
    }
}

/// etcd v3 discovery through the JSON gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// Gateway endpoints, tried in order.
    pub endpoints: Vec<String>,

    /// Key prefix; peers live at `{base_path}/{network@address}`.
    pub base_path: String,

    /// Per-request timeout in milliseconds (watch streams are not bounded).
    pub request_timeout_ms: u64,
}

impl EtcdConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            base_path: "/services".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

/// ZooKeeper discovery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ZooKeeperConfig {
    /// Ensemble members as `host:port`.
    pub servers: Vec<String>,

    /// Parent node; its children are `network@address` peers.
    pub base_path: String,

    /// Session timeout in milliseconds, negotiated with the ensemble. Also
    /// bounds how long establishing the session may take.
    pub session_timeout_ms: u64,
}

impl ZooKeeperConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

impl Default for ZooKeeperConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:2181".to_string()],
            base_path: "/services".to_string(),
            session_timeout_ms: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
