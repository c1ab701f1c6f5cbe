//! etcd discovery against a mock v3 gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use peer_selector::config::EtcdConfig;
use peer_selector::selector::{EtcdSelector, RegistryError, SelectMode, Selector};

mod common;
use common::{MockReply, MockRequest};

/// In-memory key space served by the mock gateway.
#[derive(Default)]
struct Store {
    entries: Vec<(String, String)>,
    revision: i64,
    range_requests: Vec<serde_json::Value>,
    watch_requests: usize,
}

impl Store {
    fn put(&mut self, key: &str, value: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value.to_string()));
        self.entries.sort();
        self.revision += 1;
    }

    fn delete(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.revision += 1;
    }
}

fn handle(store: &Mutex<Store>, req: MockRequest) -> (u16, String) {
    let mut store = store.lock().unwrap();
    match req.route() {
        "/v3/kv/range" => {
            store.range_requests.push(req.json());
            let kvs: Vec<serde_json::Value> = store
                .entries
                .iter()
                .map(|(k, v)| serde_json::json!({ "key": STANDARD.encode(k), "value": STANDARD.encode(v) }))
                .collect();
            let body = serde_json::json!({
                "header": { "revision": store.revision.to_string() },
                "kvs": kvs,
                "count": kvs.len().to_string(),
            });
            (200, body.to_string())
        }
        "/v3/watch" => {
            store.watch_requests += 1;
            // The stream ends right after creation, so every reconnect re-reads the range.
            let created = serde_json::json!({
                "result": { "header": { "revision": store.revision.to_string() }, "created": true }
            });
            (200, format!("{}\n", created))
        }
        _ => (404, String::new()),
    }
}

async fn start_gateway(store: Arc<Mutex<Store>>) -> std::net::SocketAddr {
    common::start_mock_registry(move |req| handle(&store, req)).await
}

fn config(endpoints: Vec<String>) -> EtcdConfig {
    EtcdConfig {
        endpoints,
        base_path: "/services".into(),
        request_timeout_ms: 1_000,
    }
}

#[tokio::test]
async fn test_initial_range_read() {
    let store = Arc::new(Mutex::new(Store::default()));
    {
        let mut s = store.lock().unwrap();
        s.put("/services/tcp@10.0.0.2:8972", "weight=4");
        s.put("/services/tcp@10.0.0.1:8972", "");
        s.put("/services/tcp@10.0.0.3:8972", "state=inactive");
        s.put("/services/Arith/tcp@10.0.0.4:8972", "");
    }
    let addr = start_gateway(store.clone()).await;

    let selector = EtcdSelector::connect(config(vec![format!("http://{}", addr)]), SelectMode::RoundRobin, Duration::from_secs(1))
        .await
        .unwrap();

    let addresses: Vec<String> = selector.peers().into_iter().map(|p| p.address).collect();
    assert_eq!(addresses, vec!["10.0.0.1:8972", "10.0.0.2:8972"]);
    assert_eq!(selector.peers()[1].weight, 4);

    let request = store.lock().unwrap().range_requests[0].clone();
    assert_eq!(request["key"], STANDARD.encode("/services/"));
    assert_eq!(request["range_end"], STANDARD.encode("/services0"));
    assert_eq!(request["sort_order"], "ASCEND");

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_watch_reconnect_refreshes_peers() {
    let store = Arc::new(Mutex::new(Store::default()));
    store.lock().unwrap().put("/services/tcp@10.0.0.1:8972", "");
    let addr = start_gateway(store.clone()).await;

    let selector = EtcdSelector::connect(config(vec![addr.to_string()]), SelectMode::RandomSelect, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(selector.peers().len(), 1);

    store.lock().unwrap().put("/services/tcp@10.0.0.2:8972", "");
    assert!(common::wait_until(Duration::from_secs(5), || selector.peers().len() == 2).await);

    store.lock().unwrap().delete("/services/tcp@10.0.0.1:8972");
    assert!(common::wait_until(Duration::from_secs(5), || {
        selector.peers().iter().map(|p| p.address.clone()).collect::<Vec<_>>() == vec!["10.0.0.2:8972"]
    })
    .await);

    assert!(store.lock().unwrap().watch_requests >= 2);
    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_falls_back_to_next_endpoint() {
    let dead = common::closed_port().await;
    let store = Arc::new(Mutex::new(Store::default()));
    store.lock().unwrap().put("/services/tcp@10.0.0.1:8972", "weight=2");
    let addr = start_gateway(store).await;

    let selector = EtcdSelector::connect(
        config(vec![format!("http://{}", dead), format!("http://{}", addr)]),
        SelectMode::WeightedRoundRobin,
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(selector.peers().len(), 1);
    assert_eq!(selector.pick(&[]).unwrap().weight, 2);
    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_unreachable_endpoints_fail_construction() {
    let dead = common::closed_port().await;
    let result = EtcdSelector::connect(config(vec![dead.to_string()]), SelectMode::RoundRobin, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(RegistryError::Http(_))));
}

#[tokio::test]
async fn test_shutdown_stops_watching() {
    let hits = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(Mutex::new(Store::default()));
    let counter = hits.clone();
    let addr = common::start_mock_registry(move |req| {
        counter.fetch_add(1, Ordering::SeqCst);
        handle(&store, req)
    })
    .await;

    let selector = EtcdSelector::connect(config(vec![addr.to_string()]), SelectMode::RoundRobin, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || hits.load(Ordering::SeqCst) >= 3).await);

    selector.shutdown();
    selector.stop_and_wait().await;

    let after_stop = hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn test_change_event_on_open_stream_refreshes() {
    let store = Arc::new(Mutex::new(Store::default()));
    store.lock().unwrap().put("/services/tcp@10.0.0.1:8972", "weight=2");
    let gateway = store.clone();
    let addr = common::start_mock_registry(move |req: MockRequest| {
        if req.route() != "/v3/watch" {
            return MockReply::from(handle(&gateway, req));
        }
        let mut store = gateway.lock().unwrap();
        store.watch_requests += 1;
        let revision = store.revision;
        let created = serde_json::json!({
            "result": { "header": { "revision": revision.to_string() }, "created": true }
        });
        let changed = serde_json::json!({
            "result": {
                "header": { "revision": (revision + 1).to_string() },
                "events": [{ "kv": { "key": STANDARD.encode("/services/tcp@10.0.0.1:8972") } }]
            }
        });
        MockReply::stream(format!("{}\n{}\n", created, changed))
    })
    .await;

    let selector = EtcdSelector::connect(config(vec![addr.to_string()]), SelectMode::RoundRobin, Duration::from_secs(1))
        .await
        .unwrap();

    assert!(common::wait_until(Duration::from_secs(5), || store.lock().unwrap().range_requests.len() >= 2).await);
    {
        let store = store.lock().unwrap();
        assert_eq!(store.watch_requests, 1);
        assert_eq!(store.range_requests.len(), 2);
    }
    let peers = selector.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].address, "10.0.0.1:8972");
    assert_eq!(peers[0].weight, 2);

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_undecodable_range_reply_falls_back_to_next_endpoint() {
    let garbled = common::start_mock_registry(|_| (200, "not json".to_string())).await;
    let store = Arc::new(Mutex::new(Store::default()));
    store.lock().unwrap().put("/services/tcp@10.0.0.1:8972", "");
    let addr = start_gateway(store.clone()).await;

    let selector = EtcdSelector::connect(
        config(vec![format!("http://{}", garbled), format!("http://{}", addr)]),
        SelectMode::RoundRobin,
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(selector.peers().len(), 1);
    assert_eq!(selector.peers()[0].address, "10.0.0.1:8972");
    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_undecodable_range_reply_everywhere_fails_construction() {
    let garbled = common::start_mock_registry(|_| (200, "not json".to_string())).await;
    let result = EtcdSelector::connect(config(vec![garbled.to_string()]), SelectMode::RoundRobin, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(RegistryError::Http(_))));
}
