//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SelectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{DiscoveryConfig, SelectorConfig};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &SelectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.dial_timeout_ms == 0 {
        errors.push(ValidationError::new("dial_timeout_ms", "must be greater than 0"));
    }

    match &config.discovery {
        DiscoveryConfig::Static(s) => {
            if s.peers.is_empty() {
                errors.push(ValidationError::new("discovery.peers", "at least one peer is required"));
            }
            for (i, peer) in s.peers.iter().enumerate() {
                if peer.address.trim().is_empty() {
                    errors.push(ValidationError::new(format!("discovery.peers[{}].address", i), "must not be empty"));
                }
                if peer.network.trim().is_empty() {
                    errors.push(ValidationError::new(format!("discovery.peers[{}].network", i), "must not be empty"));
                }
                if peer.weight == 0 {
                    errors.push(ValidationError::new(format!("discovery.peers[{}].weight", i), "must be greater than 0"));
                }
            }
        }
        DiscoveryConfig::Consul(c) => {
            if c.address.trim().is_empty() {
                errors.push(ValidationError::new("discovery.address", "must not be empty"));
            }
            if c.service_name.trim().is_empty() {
                errors.push(ValidationError::new("discovery.service_name", "must not be empty"));
            }
            if c.refresh_interval_ms == 0 {
                errors.push(ValidationError::new("discovery.refresh_interval_ms", "must be greater than 0"));
            }
            if c.request_timeout_ms == 0 {
                errors.push(ValidationError::new("discovery.request_timeout_ms", "must be greater than 0"));
            }
        }
        DiscoveryConfig::Etcd(e) => {
            if e.endpoints.is_empty() {
                errors.push(ValidationError::new("discovery.endpoints", "at least one endpoint is required"));
            }
            check_base_path(&e.base_path, &mut errors);
            if e.request_timeout_ms == 0 {
                errors.push(ValidationError::new("discovery.request_timeout_ms", "must be greater than 0"));
            }
        }
        DiscoveryConfig::ZooKeeper(z) => {
            if z.servers.is_empty() {
                errors.push(ValidationError::new("discovery.servers", "at least one server is required"));
            }
            check_base_path(&z.base_path, &mut errors);
            if z.session_timeout_ms == 0 {
                errors.push(ValidationError::new("discovery.session_timeout_ms", "must be greater than 0"));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_base_path(path: &str, errors: &mut Vec<ValidationError>) {
    if !path.starts_with('/') {
        errors.push(ValidationError::new("discovery.base_path", "must start with '/'"));
    } else if path.len() > 1 && path.ends_with('/') {
        errors.push(ValidationError::new("discovery.base_path", "must not end with '/'"));
    }
}
