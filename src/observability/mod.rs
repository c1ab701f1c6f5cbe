//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Selectors produce:
//!     → logging.rs (structured refresh/selection events via `tracing`)
//!     → metrics.rs (selection outcomes, refresh outcomes, peer counts)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Refresh failures log at warn, steady-state refreshes at debug
//! - Metric updates go through the `metrics` facade and are no-ops until a
//!   recorder is installed, so library users pay nothing by default

pub mod logging;
pub mod metrics;
