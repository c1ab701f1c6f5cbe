//! Transport connection subsystem.
//!
//! # Data Flow
//! ```text
//! Selector picks a peer (network, address)
//!     → connector.rs (ConnectionFactory::open with dial timeout)
//!     → connection.rs (connection identity, stream ownership)
//!     → Handed to the RPC codec (outside this crate)
//! ```
//!
//! # Design Decisions
//! - Selectors never own a factory; callers pass one per call
//! - Factories never retry; failures go straight back to the caller
//! - Only stream transports of the `tcp` family are built in

pub mod connection;
pub mod connector;

pub use connection::{Connection, ConnectionId};
pub use connector::{ConnectError, ConnectionFactory, TcpConnector};
