//! Consul agent discovery.
//!
//! Polls `GET /v1/agent/services` on a fixed interval. Every service whose ID
//! starts with the configured name is a peer; its first tag carries the
//! metadata blob.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use url::Url;

use crate::config::ConsulConfig;
use crate::observability::metrics;
use crate::selector::error::{RegistryError, SelectError};
use crate::selector::jump_hash::HashFn;
use crate::selector::mode::SelectMode;
use crate::selector::peer::{DiscoveredPeer, Peer};
use crate::selector::refresh::RefreshTask;
use crate::selector::server_set::ServerSet;
use crate::selector::state::SelectorState;
use crate::selector::{registry_base_url, Selector};

const BACKEND: &str = "consul";

/// One entry of the agent services listing.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Service", default)]
    pub service: String,

    #[serde(rename = "Tags", default)]
    pub tags: Option<Vec<String>>,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Port", default)]
    pub port: u16,
}

impl AgentService {
    /// Registry key in `network@address` form.
    pub fn peer_key(&self) -> String {
        if self.address.contains('@') {
            self.address.clone()
        } else {
            format!("tcp@{}:{}", self.address, self.port)
        }
    }

    pub fn metadata(&self) -> &str {
        self.tags
            .as_ref()
            .and_then(|tags| tags.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Turn an agent listing into discovery entries, ordered by service ID.
pub fn discovered_services(services: &BTreeMap<String, AgentService>, service_name: &str) -> Vec<DiscoveredPeer> {
    services
        .iter()
        .filter(|(id, _)| id.starts_with(service_name))
        .filter_map(|(id, service)| {
            let key = service.peer_key();
            let entry = DiscoveredPeer::from_registry(&key, service.metadata());
            if entry.is_none() {
                tracing::debug!(backend = BACKEND, service = %id, key = %key, "Skipping service with unusable address");
            }
            entry
        })
        .collect()
}

/// HTTP client for the agent endpoint.
#[derive(Debug, Clone)]
struct ConsulClient {
    http: reqwest::Client,
    services_url: Url,
    token: Option<String>,
    service_name: String,
}

impl ConsulClient {
    fn new(config: &ConsulConfig) -> Result<Self, RegistryError> {
        let mut services_url = registry_base_url(&config.address)?
            .join("v1/agent/services")
            .map_err(|e| RegistryError::InvalidPath(e.to_string()))?;
        if let Some(dc) = config.datacenter.as_deref().filter(|dc| !dc.is_empty()) {
            services_url.query_pairs_mut().append_pair("dc", dc);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            services_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            service_name: config.service_name.clone(),
        })
    }

    async fn pull(&self) -> Result<ServerSet, RegistryError> {
        let mut request = self.http.get(self.services_url.clone());
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }

        let services: BTreeMap<String, AgentService> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ServerSet::from_discovered(discovered_services(&services, &self.service_name)))
    }
}

/// Selector over services registered with a Consul agent.
#[derive(Debug)]
pub struct ConsulSelector {
    state: Arc<SelectorState>,
    refresh: RefreshTask,
}

impl ConsulSelector {
    /// Build the client, attempt a first pull and start polling.
    ///
    /// A failed first pull is not fatal: the selector starts empty and the
    /// next tick retries. A zero refresh interval is rejected.
    pub async fn connect(config: ConsulConfig, mode: SelectMode, dial_timeout: Duration) -> Result<Self, RegistryError> {
        if config.refresh_interval().is_zero() {
            return Err(RegistryError::InvalidConfig("refresh_interval_ms must be greater than 0".to_string()));
        }
        let client = ConsulClient::new(&config)?;
        let state = Arc::new(SelectorState::new(BACKEND, mode, dial_timeout));

        match client.pull().await {
            Ok(set) => {
                metrics::record_refresh(BACKEND, "ok");
                state.publish(set);
            }
            Err(e) => {
                metrics::record_refresh(BACKEND, "error");
                tracing::warn!(
                    backend = BACKEND,
                    address = %config.address,
                    error = %e,
                    "Initial service pull failed, starting empty"
                );
            }
        }

        let interval = config.refresh_interval();
        let refresh = RefreshTask::spawn(BACKEND, {
            let state = state.clone();
            move |shutdown| poll_loop(client, state, interval, shutdown)
        });

        Ok(Self { state, refresh })
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop_and_wait(&self) {
        self.refresh.stop_and_wait().await;
    }
}

async fn poll_loop(
    client: ConsulClient,
    state: Arc<SelectorState>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.pull().await {
                    Ok(set) => {
                        metrics::record_refresh(BACKEND, "ok");
                        state.publish(set);
                    }
                    Err(e) => {
                        metrics::record_refresh(BACKEND, "error");
                        tracing::warn!(backend = BACKEND, error = %e, "Service pull failed, keeping previous peers");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!(backend = BACKEND, "Poll loop exiting");
                break;
            }
        }
    }
}

impl Selector for ConsulSelector {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn pick(&self, key: &[&str]) -> Result<Peer, SelectError> {
        self.state.pick(key)
    }

    fn peers(&self) -> Vec<Peer> {
        self.state.peers()
    }

    fn select_mode(&self) -> SelectMode {
        self.state.select_mode()
    }

    fn set_select_mode(&self, mode: SelectMode) {
        self.state.set_select_mode(mode);
    }

    fn set_hash_fn(&self, hash_fn: HashFn) {
        self.state.set_hash_fn(hash_fn);
    }

    fn dial_timeout(&self) -> Duration {
        self.state.dial_timeout()
    }

    fn shutdown(&self) {
        self.refresh.stop();
    }
}
