//! ZooKeeper discovery.
//!
//! Children of the base path are `network@address` peer keys; each child's
//! data is its metadata blob. A one-shot child watch drives every re-pull.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time;
use zookeeper_client as zk;

use crate::config::ZooKeeperConfig;
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::selector::error::{RegistryError, SelectError};
use crate::selector::jump_hash::HashFn;
use crate::selector::mode::SelectMode;
use crate::selector::peer::{DiscoveredPeer, Peer};
use crate::selector::refresh::RefreshTask;
use crate::selector::server_set::ServerSet;
use crate::selector::state::SelectorState;
use crate::selector::Selector;

const BACKEND: &str = "zookeeper";

/// Consecutive watch failures before the session is rebuilt.
const RECONNECT_AFTER_FAILURES: u32 = 3;

/// Check that `path` is an absolute node path.
pub fn validate_path(path: &str) -> Result<(), RegistryError> {
    if !path.starts_with('/') {
        return Err(RegistryError::InvalidPath(format!("{} is not absolute", path)));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(RegistryError::InvalidPath(format!("{} has a trailing slash", path)));
    }
    if path[1..].split('/').any(str::is_empty) {
        return Err(RegistryError::InvalidPath(format!("{} has an empty segment", path)));
    }
    Ok(())
}

pub fn child_path(base: &str, child: &str) -> String {
    if base == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", base, child)
    }
}

/// Every ancestor of `path` including itself, shallowest first.
fn ancestors(path: &str) -> Vec<String> {
    let mut current = String::new();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            current.push('/');
            current.push_str(segment);
            current.clone()
        })
        .collect()
}

/// Create `path` and any missing parents as persistent nodes.
pub async fn ensure_path(client: &zk::Client, path: &str) -> Result<(), RegistryError> {
    validate_path(path)?;
    let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());

    for node in ancestors(path) {
        if client.check_stat(&node).await?.is_some() {
            continue;
        }
        match client.create(&node, &[], &options).await {
            Ok(_) => tracing::info!(backend = BACKEND, path = %node, "Created node"),
            Err(zk::Error::NodeExists) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Open a session with `session_timeout` as both the negotiated session
/// timeout and the bound on establishing it.
async fn connect_client(servers: &[String], session_timeout: Duration) -> Result<zk::Client, RegistryError> {
    let cluster = servers.join(",");
    let mut connector = zk::Client::connector();
    connector.session_timeout(session_timeout).connection_timeout(session_timeout);
    match time::timeout(session_timeout, connector.connect(&cluster)).await {
        Ok(client) => Ok(client?),
        Err(_) => Err(RegistryError::ConnectTimeout(session_timeout)),
    }
}

/// List the children of `base`, read their metadata and arm a child watch.
async fn pull(client: &zk::Client, base: &str) -> Result<(ServerSet, zk::OneshotWatcher), RegistryError> {
    let (mut children, watcher) = client.list_and_watch_children(base).await?;
    children.sort();

    let mut entries = Vec::with_capacity(children.len());
    for child in &children {
        let metadata = match client.get_data(&child_path(base, child)).await {
            Ok((data, _)) => String::from_utf8_lossy(&data).into_owned(),
            Err(e) => {
                tracing::debug!(backend = BACKEND, child = %child, error = %e, "No metadata for child");
                String::new()
            }
        };
        match DiscoveredPeer::from_registry(child, &metadata) {
            Some(entry) => entries.push(entry),
            None => tracing::debug!(backend = BACKEND, child = %child, "Skipping child that is not a peer key"),
        }
    }

    Ok((ServerSet::from_discovered(entries), watcher))
}

/// What the watch loop needs from a child-listing registry.
#[async_trait]
trait ChildRegistry: Send + Sync + 'static {
    type Watch: Send + 'static;

    /// List the peers and arm a one-shot watch on the listing.
    async fn list(&self) -> Result<(ServerSet, Self::Watch), RegistryError>;

    /// Resolve once the armed watch fires.
    async fn changed(&self, watch: Self::Watch);

    /// Replace the session.
    async fn reconnect(&mut self) -> Result<(), RegistryError>;
}

/// Live session plus the node it lists.
struct Session {
    client: zk::Client,
    config: ZooKeeperConfig,
}

#[async_trait]
impl ChildRegistry for Session {
    type Watch = zk::OneshotWatcher;

    async fn list(&self) -> Result<(ServerSet, zk::OneshotWatcher), RegistryError> {
        pull(&self.client, &self.config.base_path).await
    }

    async fn changed(&self, watch: zk::OneshotWatcher) {
        let event = watch.changed().await;
        tracing::debug!(backend = BACKEND, ?event, "Child watch fired");
    }

    async fn reconnect(&mut self) -> Result<(), RegistryError> {
        tracing::info!(backend = BACKEND, "Reconnecting zookeeper session");
        self.client = connect_client(&self.config.servers, self.config.session_timeout()).await?;
        Ok(())
    }
}

/// Selector over the children of a ZooKeeper node.
#[derive(Debug)]
pub struct ZooKeeperSelector {
    state: Arc<SelectorState>,
    refresh: RefreshTask,
}

impl ZooKeeperSelector {
    /// Open a session, ensure the base path exists, read it once and start
    /// watching it.
    pub async fn connect(config: ZooKeeperConfig, mode: SelectMode, dial_timeout: Duration) -> Result<Self, RegistryError> {
        validate_path(&config.base_path)?;
        if config.servers.is_empty() {
            return Err(RegistryError::Unavailable("no zookeeper servers configured".to_string()));
        }

        let client = connect_client(&config.servers, config.session_timeout()).await?;
        ensure_path(&client, &config.base_path).await?;

        tracing::info!(
            backend = BACKEND,
            servers = %config.servers.join(","),
            path = %config.base_path,
            "Watching zookeeper node"
        );

        let state = Arc::new(SelectorState::new(BACKEND, mode, dial_timeout));
        let refresh = start(Session { client, config }, state.clone(), Backoff::default()).await?;
        Ok(Self { state, refresh })
    }

    /// Stop watching and wait for the task to exit.
    pub async fn stop_and_wait(&self) {
        self.refresh.stop_and_wait().await;
    }
}

/// Publish the first listing, then keep it current in the background.
async fn start<R: ChildRegistry>(
    registry: R,
    state: Arc<SelectorState>,
    backoff: Backoff,
) -> Result<RefreshTask, RegistryError> {
    let (set, watch) = match registry.list().await {
        Ok(listed) => listed,
        Err(e) => {
            metrics::record_refresh(BACKEND, "error");
            return Err(e);
        }
    };
    metrics::record_refresh(BACKEND, "ok");
    state.publish(set);

    Ok(RefreshTask::spawn(BACKEND, move |shutdown| {
        watch_loop(registry, state, watch, backoff, shutdown)
    }))
}

async fn watch_loop<R: ChildRegistry>(
    mut registry: R,
    state: Arc<SelectorState>,
    watch: R::Watch,
    mut backoff: Backoff,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut watch = Some(watch);

    loop {
        if let Some(armed) = watch.take() {
            tokio::select! {
                _ = registry.changed(armed) => {}
                _ = shutdown.recv() => break,
            }
        }

        let round = async {
            if backoff.attempts() >= RECONNECT_AFTER_FAILURES {
                registry.reconnect().await?;
            }
            registry.list().await
        };

        let outcome = tokio::select! {
            outcome = round => outcome,
            _ = shutdown.recv() => break,
        };

        match outcome {
            Ok((set, armed)) => {
                metrics::record_refresh(BACKEND, "ok");
                state.publish(set);
                backoff.reset();
                watch = Some(armed);
            }
            Err(e) => {
                metrics::record_refresh(BACKEND, "error");
                let delay = backoff.next_delay();
                tracing::warn!(
                    backend = BACKEND,
                    error = %e,
                    attempt = backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Child watch failed, keeping previous peers"
                );
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }
    }

    tracing::debug!(backend = BACKEND, "Watch loop exiting");
}

impl Selector for ZooKeeperSelector {
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
