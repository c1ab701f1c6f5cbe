//! Selection and discovery error definitions.

use std::time::Duration;
use thiserror::Error;

use crate::net::ConnectError;

/// Errors returned to the caller of a selection.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The cached peer set is empty.
    #[error("No available service")]
    NoAvailableService,

    /// The configured mode has no matching algorithm.
    #[error("Unsupported select mode: {0}")]
    UnsupportedSelectMode(String),

    /// The connection factory could not reach the chosen peer.
    #[error("Connection to {network}@{address} failed: {source}")]
    Connection {
        network: String,
        address: String,
        source: ConnectError,
    },
}

/// Errors raised while talking to a discovery registry.
///
/// Only construction surfaces these; refresh cycles log them and keep the
/// previous snapshot.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registry endpoint could serve the request.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// HTTP transport or status failure (Consul, etcd).
    #[error("Registry HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with something we could not decode.
    #[error("Registry decode error: {0}")]
    Decode(String),

    /// ZooKeeper client failure.
    #[error("ZooKeeper error: {0}")]
    ZooKeeper(#[from] zookeeper_client::Error),

    /// The registry session could not be established in time.
    #[error("Registry connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Settings the backend cannot run with.
    #[error("Invalid registry config: {0}")]
    InvalidConfig(String),

    /// Malformed registry address or base path.
    #[error("Invalid registry path: {0}")]
    InvalidPath(String),
}

/// Result type for selection operations.
pub type SelectResult<T> = Result<T, SelectError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
