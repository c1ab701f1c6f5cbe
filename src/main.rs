//! Peer selector demo.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 PEER SELECTOR                │
//!                    │                                              │
//!   Registry         │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!   (consul/etcd/ ───┼─▶│ refresh  │──▶│ snapshot │──▶│ balancer │  │
//!    zookeeper)      │  │  task    │   │ ArcSwap  │   │  (mode)  │  │
//!                    │  └──────────┘   └──────────┘   └────┬─────┘  │
//!                    │                                     │        │
//!   RPC call ────────┼────────────── select(key) ──────────┘        │
//!                    │                                     │        │
//!                    │                              ┌──────▼─────┐  │
//!   Peer ◀───────────┼──────────────────────────────│ connector  │  │
//!                    │                              └────────────┘  │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! Loads a configuration file, builds the configured selector, performs a
//! number of selections against it and then waits for a shutdown signal.
//! Edits to `select_mode` in the file are applied while running.

use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tokio::time;

use peer_selector::config::{load_config, ConfigWatcher};
use peer_selector::lifecycle::signals::wait_for_signal;
use peer_selector::net::TcpConnector;
use peer_selector::observability::{logging, metrics};
use peer_selector::selector::{self, SelectorExt};

#[derive(Parser)]
#[command(name = "peer-selector")]
#[command(about = "Pick RPC peers from a static list or a discovery registry", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = "selector.toml")]
    config: PathBuf,

    /// Number of selections to perform.
    #[arg(short = 'n', long, default_value_t = 10)]
    calls: u32,

    /// Pause between selections.
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// Consistent-hash key parts (e.g. service method then arguments).
    #[arg(short, long)]
    key: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        path = %cli.config.display(),
        backend = config.discovery.kind(),
        mode = %config.select_mode,
        dial_timeout_ms = config.dial_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let selector = selector::build(&config).await?;

    let (watcher, mut mode_updates) = ConfigWatcher::new(&cli.config, config.clone());
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, select mode is fixed");
            None
        }
    };

    let connector = TcpConnector::new();
    let key: Vec<&str> = cli.key.iter().map(String::as_str).collect();
    let interval = Duration::from_millis(cli.interval_ms);

    let calls = async {
        for call in 1..=cli.calls {
            while let Ok(mode) = mode_updates.try_recv() {
                selector.set_select_mode(mode);
            }

            match selector.select(&connector, &key).await {
                Ok(conn) => tracing::info!(
                    call,
                    mode = %selector.select_mode(),
                    peer = %format!("{}@{}", conn.network(), conn.address()),
                    connection_id = conn.id().as_u64(),
                    "Selected peer"
                ),
                Err(e) => tracing::warn!(call, mode = %selector.select_mode(), error = %e, "Selection failed"),
            }

            time::sleep(interval).await;
        }
        tracing::info!(calls = cli.calls, "Selections done, waiting for shutdown signal");
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = calls => {}
        _ = wait_for_signal() => {}
    }

    selector.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
