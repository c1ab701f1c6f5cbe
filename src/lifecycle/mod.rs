//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Selector construction:
//!     Initial pull → publish snapshot → spawn refresh task (subscribed to Shutdown)
//!
//! Shutdown (shutdown.rs):
//!     Selector::shutdown() or drop → trigger → refresh loops exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → demo binary stops its selector
//! ```
//!
//! # Design Decisions
//! - One shutdown coordinator per selector, never shared across selectors
//! - Refresh loops select on the shutdown channel at every await point
//! - A closed channel counts as shutdown, so dropping the owner is enough

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
