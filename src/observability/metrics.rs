//! Metrics collection and exposition.
//!
//! # Metrics
//! - `selector_selections_total` (counter): picks by backend, mode, outcome
//! - `selector_refreshes_total` (counter): registry refreshes by backend, outcome
//! - `selector_peers` (gauge): peers in the current snapshot

use std::net::SocketAddr;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_selection(backend: &'static str, mode: &'static str, outcome: &'static str) {
    metrics::counter!(
        "selector_selections_total",
        "backend" => backend,
        "mode" => mode,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_refresh(backend: &'static str, outcome: &'static str) {
    metrics::counter!("selector_refreshes_total", "backend" => backend, "outcome" => outcome).increment(1);
}

pub fn record_peer_count(backend: &'static str, count: usize) {
    metrics::gauge!("selector_peers", "backend" => backend).set(count as f64);
}
