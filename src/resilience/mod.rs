//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Registry watch/pull fails
//!     → backoff.rs (exponential delay with jitter)
//!     → sleep, racing the selector's shutdown signal
//!     → reconnect and re-pull
//! ```
//!
//! # Design Decisions
//! - Only background refresh retries; selection never retries
//! - Delays are capped so a recovered registry is noticed quickly

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
