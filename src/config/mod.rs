//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SelectorConfig (validated, immutable)
//!     → selector::build picks the discovery backend
//!
//! On file change:
//!     watcher.rs reloads and validates
//!     → emits the new SelectMode if it changed
//!     → Selector::set_select_mode hot-swaps the algorithm
//! ```
//!
//! # Design Decisions
//! - Only the select mode is live-reloadable; discovery changes need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ConsulConfig, DiscoveryConfig, EtcdConfig, LogFormat, ObservabilityConfig, SelectorConfig,
    StaticConfig, ZooKeeperConfig,
};
pub use watcher::ConfigWatcher;
