//! Connection factories.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio::time;

use crate::net::connection::Connection;

/// Errors raised while opening a connection to a peer.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Dial timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("No {network} address for {address}")]
    NoAddress { network: String, address: String },
}

/// Opens transport connections for the selector.
///
/// Implementations must be safe to call concurrently from any number of
/// selectors.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Send;

    async fn open(
        &self,
        network: &str,
        address: &str,
        dial_timeout: Duration,
    ) -> Result<Self::Connection, ConnectError>;
}

/// Address family filter for the `tcp` network names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn from_network(network: &str) -> Option<Self> {
        match network {
            "tcp" => Some(Family::Any),
            "tcp4" => Some(Family::V4),
            "tcp6" => Some(Family::V6),
            _ => None,
        }
    }

    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

/// Plain TCP connection factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }

    async fn dial(family: Family, network: &str, address: &str) -> Result<TcpStream, ConnectError> {
        let addrs: Vec<SocketAddr> = lookup_host(address)
            .await?
            .filter(|a| family.matches(a))
            .collect();

        if addrs.is_empty() {
            return Err(ConnectError::NoAddress {
                network: network.to_string(),
                address: address.to_string(),
            });
        }

        let stream = TcpStream::connect(&addrs[..]).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnector {
    type Connection = Connection;

    async fn open(
        &self,
        network: &str,
        address: &str,
        dial_timeout: Duration,
    ) -> Result<Connection, ConnectError> {
        let family = Family::from_network(network)
            .ok_or_else(|| ConnectError::UnsupportedNetwork(network.to_string()))?;

        let stream = time::timeout(dial_timeout, Self::dial(family, network, address))
            .await
            .map_err(|_| ConnectError::Timeout(dial_timeout))??;

        Ok(Connection::new(network, address, stream))
    }
}
