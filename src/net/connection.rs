//! Connections opened to selected peers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An open stream to one peer.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    network: String,
    address: String,
    stream: TcpStream,
}

impl Connection {
    pub fn new(network: impl Into<String>, address: impl Into<String>, stream: TcpStream) -> Self {
        let conn = Self {
            id: ConnectionId::new(),
            network: network.into(),
            address: address.into(),
            stream,
        };
        tracing::trace!(connection_id = %conn.id, network = %conn.network, address = %conn.address, "Connection opened");
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Address as configured or discovered, before resolution.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resolved remote address of the stream.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}
