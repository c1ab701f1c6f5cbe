//! etcd v3 discovery through the JSON gateway.
//!
//! Peers live under `{base_path}/{network@address}` with the metadata blob as
//! the value. A prefix range read builds the snapshot; a watch stream on the
//! same range triggers a full re-pull whenever it reports events.

use std::sync::Arc;
use std::time::Duration;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time;
use url::Url;

use crate::config::EtcdConfig;
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::selector::error::{RegistryError, SelectError};
use crate::selector::jump_hash::HashFn;
use crate::selector::mode::SelectMode;
use crate::selector::peer::{DiscoveredPeer, Peer};
use crate::selector::refresh::RefreshTask;
use crate::selector::server_set::ServerSet;
use crate::selector::state::SelectorState;
use crate::selector::{registry_base_url, Selector};

const BACKEND: &str = "etcd";

/// Key prefix for a base path: `/services` becomes `/services/`.
pub fn key_prefix(base_path: &str) -> String {
    if base_path.ends_with('/') {
        base_path.to_string()
    } else {
        format!("{}/", base_path)
    }
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // Every byte was 0xff: "\0" means no upper bound.
    vec![0]
}

/// The peer key below `prefix`, or `None` for nested or foreign keys.
pub fn peer_key<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest)
}

/// The gateway encodes 64-bit integers as JSON strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Int64 {
    Text(String),
    Number(i64),
}

impl Int64 {
    fn value(&self) -> Result<i64, RegistryError> {
        match self {
            Int64::Number(n) => Ok(*n),
            Int64::Text(s) => s
                .parse()
                .map_err(|_| RegistryError::Decode(format!("bad revision {:?}", s))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    revision: Option<Int64>,
}

impl ResponseHeader {
    fn revision(&self) -> Result<i64, RegistryError> {
        self.revision.as_ref().map_or(Ok(0), Int64::value)
    }
}

#[derive(Debug, Serialize)]
struct RangeRequest<'a> {
    key: &'a str,
    range_end: &'a str,
    sort_order: &'static str,
    sort_target: &'static str,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    header: ResponseHeader,
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize)]
struct WatchRequest<'a> {
    create_request: WatchCreateRequest<'a>,
}

#[derive(Debug, Serialize)]
struct WatchCreateRequest<'a> {
    key: &'a str,
    range_end: &'a str,
    start_revision: String,
}

#[derive(Debug, Deserialize)]
struct WatchEnvelope {
    result: Option<WatchResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WatchResult {
    header: ResponseHeader,
    created: bool,
    canceled: bool,
    cancel_reason: String,
    events: Vec<IgnoredAny>,
}

/// One line of the watch stream, classified.
#[derive(Debug, PartialEq, Eq)]
enum WatchMessage {
    Created,
    Changed { revision: i64 },
    Progress,
    Canceled(String),
}

fn parse_watch_line(line: &[u8]) -> Result<WatchMessage, RegistryError> {
    let envelope: WatchEnvelope =
        serde_json::from_slice(line).map_err(|e| RegistryError::Decode(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Ok(WatchMessage::Canceled(error.to_string()));
    }
    let Some(result) = envelope.result else {
        return Ok(WatchMessage::Progress);
    };

    if result.canceled {
        Ok(WatchMessage::Canceled(result.cancel_reason))
    } else if !result.events.is_empty() {
        Ok(WatchMessage::Changed { revision: result.header.revision()? })
    } else if result.created {
        Ok(WatchMessage::Created)
    } else {
        Ok(WatchMessage::Progress)
    }
}

/// Gateway client bound to one key prefix.
#[derive(Debug, Clone)]
struct EtcdClient {
    http: reqwest::Client,
    endpoints: Vec<Url>,
    prefix: String,
    key: String,
    range_end: String,
    request_timeout: Duration,
}

impl EtcdClient {
    fn new(config: &EtcdConfig) -> Result<Self, RegistryError> {
        if config.endpoints.is_empty() {
            return Err(RegistryError::Unavailable("no etcd endpoints configured".to_string()));
        }
        let endpoints = config
            .endpoints
            .iter()
            .map(String::as_str)
            .map(registry_base_url)
            .collect::<Result<Vec<_>, _>>()?;

        let prefix = key_prefix(&config.base_path);
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoints,
            key: STANDARD.encode(prefix.as_bytes()),
            range_end: STANDARD.encode(prefix_range_end(prefix.as_bytes())),
            prefix,
            request_timeout: config.request_timeout(),
        })
    }

    /// Read every peer under the prefix. Returns the snapshot and the store
    /// revision it was read at.
    async fn pull(&self) -> Result<(ServerSet, i64), RegistryError> {
        let body = RangeRequest {
            key: &self.key,
            range_end: &self.range_end,
            sort_order: "ASCEND",
            sort_target: "KEY",
        };

        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = join(endpoint, "v3/kv/range")?;
            let response = self
                .http
                .post(url)
                .timeout(self.request_timeout)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            let range = match response {
                Ok(response) => response.json::<RangeResponse>().await.map_err(RegistryError::from),
                Err(e) => Err(e.into()),
            };
            match range.and_then(|range| Ok((range.header.revision()?, range.kvs))) {
                Ok((revision, kvs)) => return Ok((ServerSet::from_discovered(self.decode(kvs)), revision)),
                Err(e) => {
                    tracing::debug!(backend = BACKEND, endpoint = %endpoint, error = %e, "Range request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RegistryError::Unavailable("no etcd endpoints configured".to_string())))
    }

    fn decode(&self, kvs: Vec<KeyValue>) -> Vec<DiscoveredPeer> {
        kvs.into_iter()
            .filter_map(|kv| {
                let key = STANDARD.decode(&kv.key).ok().and_then(|k| String::from_utf8(k).ok());
                let Some(key) = key else {
                    tracing::debug!(backend = BACKEND, key = %kv.key, "Skipping undecodable key");
                    return None;
                };
                let value = STANDARD
                    .decode(&kv.value)
                    .ok()
                    .and_then(|v| String::from_utf8(v).ok())
                    .unwrap_or_default();
                DiscoveredPeer::from_registry(peer_key(&key, &self.prefix)?, &value)
            })
            .collect()
    }

    /// Open a watch stream on the first endpoint that accepts one.
    async fn open_watch(&self, start_revision: i64) -> Result<reqwest::Response, RegistryError> {
        let body = WatchRequest {
            create_request: WatchCreateRequest {
                key: &self.key,
                range_end: &self.range_end,
                start_revision: start_revision.to_string(),
            },
        };

        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = join(endpoint, "v3/watch")?;
            match self.http.post(url).json(&body).send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::debug!(backend = BACKEND, endpoint = %endpoint, error = %e, "Watch request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => RegistryError::Http(e),
            None => RegistryError::Unavailable("no etcd endpoints configured".to_string()),
        })
    }

    /// Follow one watch stream, re-pulling on every change. Returns when the
    /// stream ends; `revision` tracks the last snapshot published.
    async fn watch(
        &self,
        state: &SelectorState,
        revision: &mut i64,
        backoff: &mut Backoff,
    ) -> Result<(), RegistryError> {
        let mut response = self.open_watch(*revision + 1).await?;
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }

                match parse_watch_line(&line)? {
                    WatchMessage::Created => {
                        backoff.reset();
                        tracing::debug!(backend = BACKEND, revision = *revision, "Watch established");
                    }
                    WatchMessage::Changed { revision: event_revision } => {
                        tracing::debug!(backend = BACKEND, revision = event_revision, "Watch reported changes");
                        let (set, pulled) = self.pull().await?;
                        metrics::record_refresh(BACKEND, "ok");
                        state.publish(set);
                        *revision = pulled.max(event_revision);
                    }
                    WatchMessage::Progress => {}
                    WatchMessage::Canceled(reason) => {
                        return Err(RegistryError::Unavailable(format!("watch canceled: {}", reason)));
                    }
                }
            }
        }
        Ok(())
    }
}

fn join(endpoint: &Url, path: &str) -> Result<Url, RegistryError> {
    endpoint
        .join(path)
        .map_err(|e| RegistryError::InvalidPath(format!("{}{}: {}", endpoint, path, e)))
}

/// Selector over peers registered under an etcd key prefix.
#[derive(Debug)]
pub struct EtcdSelector {
    state: Arc<SelectorState>,
    refresh: RefreshTask,
}

impl EtcdSelector {
    /// Read the prefix once and start watching it.
    ///
    /// Fails when no endpoint answers the first read.
    pub async fn connect(config: EtcdConfig, mode: SelectMode, dial_timeout: Duration) -> Result<Self, RegistryError> {
        let client = EtcdClient::new(&config)?;
        let state = Arc::new(SelectorState::new(BACKEND, mode, dial_timeout));

        let (set, revision) = match client.pull().await {
            Ok(pulled) => pulled,
            Err(e) => {
                metrics::record_refresh(BACKEND, "error");
                return Err(e);
            }
        };
        metrics::record_refresh(BACKEND, "ok");
        state.publish(set);

        tracing::info!(
            backend = BACKEND,
            prefix = %client.prefix,
            revision,
            "Watching etcd prefix"
        );

        let refresh = RefreshTask::spawn(BACKEND, {
            let state = state.clone();
            move |shutdown| watch_loop(client, state, revision, shutdown)
        });

        Ok(Self { state, refresh })
    }

    /// Stop watching and wait for the task to exit.
    pub async fn stop_and_wait(&self) {
        self.refresh.stop_and_wait().await;
    }
}

async fn watch_loop(
    client: EtcdClient,
    state: Arc<SelectorState>,
    mut revision: i64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut backoff = Backoff::default();
    let mut stale = false;

    loop {
        let round = async {
            if stale {
                let (set, pulled) = client.pull().await?;
                metrics::record_refresh(BACKEND, "ok");
                state.publish(set);
                revision = pulled;
            }
            client.watch(&state, &mut revision, &mut backoff).await
        };

        let outcome = tokio::select! {
            outcome = round => outcome,
            _ = shutdown.recv() => break,
        };

        // Anything may have changed while the stream was down.
        stale = true;
        let delay = match outcome {
            Ok(()) => {
                tracing::debug!(backend = BACKEND, "Watch stream ended, reconnecting");
                backoff.next_delay()
            }
            Err(e) => {
                metrics::record_refresh(BACKEND, "error");
                let delay = backoff.next_delay();
                tracing::warn!(
                    backend = BACKEND,
                    error = %e,
                    attempt = backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Watch failed, keeping previous peers"
                );
                delay
            }
        };

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shutdown.recv() => break,
        }
    }

    tracing::debug!(backend = BACKEND, "Watch loop exiting");
}

impl Selector for EtcdSelector {
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
