//! Consul discovery against a mock agent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use peer_selector::config::ConsulConfig;
use peer_selector::selector::{ConsulSelector, SelectError, SelectMode, Selector, SelectorExt};

mod common;
use common::{MockRequest, RecordingFactory};

fn service(id: &str, address: &str, tag: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "ID": id,
        "Service": id.split('-').next().unwrap_or(id),
        "Tags": tag.map(|t| vec![t]),
        "Address": address,
        "Port": 0,
    })
}

fn listing(services: &[serde_json::Value]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = services
        .iter()
        .map(|s| (s["ID"].as_str().unwrap().to_string(), s.clone()))
        .collect();
    serde_json::Value::Object(map).to_string()
}

fn config(addr: std::net::SocketAddr, refresh_ms: u64) -> ConsulConfig {
    ConsulConfig {
        address: format!("http://{}", addr),
        service_name: "Arith".into(),
        refresh_interval_ms: refresh_ms,
        request_timeout_ms: 1_000,
        ..ConsulConfig::default()
    }
}

#[tokio::test]
async fn test_initial_pull_filters_and_weights() {
    let body = listing(&[
        service("Arith-b", "tcp@10.0.0.2:8972", Some("weight=3")),
        service("Arith-a", "tcp@10.0.0.1:8972", None),
        service("Arith-c", "tcp@10.0.0.3:8972", Some("state=inactive")),
        service("Echo-a", "tcp@10.0.0.9:8972", None),
    ]);
    let addr = common::start_mock_registry(move |req: MockRequest| {
        if req.route() == "/v1/agent/services" {
            (200, body.clone())
        } else {
            (404, String::new())
        }
    })
    .await;

    let selector = ConsulSelector::connect(config(addr, 60_000), SelectMode::WeightedRoundRobin, Duration::from_secs(1))
        .await
        .unwrap();

    let peers = selector.peers();
    let addresses: Vec<&str> = peers.iter().map(|p| p.address.as_str()).collect();
    assert_eq!(addresses, vec!["10.0.0.1:8972", "10.0.0.2:8972"]);
    assert_eq!(peers[1].weight, 3);

    let factory = RecordingFactory::new();
    for _ in 0..4 {
        selector.select(&factory, &[]).await.unwrap();
    }
    assert_eq!(
        factory.dialed(),
        vec!["10.0.0.2:8972", "10.0.0.1:8972", "10.0.0.2:8972", "10.0.0.2:8972"]
    );

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_sends_token_and_datacenter() {
    let seen: Arc<Mutex<Vec<MockRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let addr = common::start_mock_registry(move |req: MockRequest| {
        recorded.lock().unwrap().push(req);
        (200, "{}".to_string())
    })
    .await;

    let mut cfg = config(addr, 60_000);
    cfg.token = Some("secret".into());
    cfg.datacenter = Some("dc2".into());
    let selector = ConsulSelector::connect(cfg, SelectMode::RandomSelect, Duration::from_secs(1))
        .await
        .unwrap();

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/v1/agent/services?dc=dc2");
    assert_eq!(requests[0].header("x-consul-token"), Some("secret"));

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_refresh_picks_up_changes() {
    let services = Arc::new(Mutex::new(vec![service("Arith-1", "tcp@10.0.0.1:8972", None)]));
    let current = services.clone();
    let addr = common::start_mock_registry(move |_| (200, listing(&current.lock().unwrap())))
        .await;

    let selector = ConsulSelector::connect(config(addr, 50), SelectMode::RoundRobin, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(selector.peers().len(), 1);

    services
        .lock()
        .unwrap()
        .push(service("Arith-2", "10.0.0.2", None));
    assert!(common::wait_until(Duration::from_secs(3), || selector.peers().len() == 2).await);
    assert_eq!(selector.peers()[1].address, "10.0.0.2:0");

    services.lock().unwrap().clear();
    assert!(common::wait_until(Duration::from_secs(3), || selector.peers().is_empty()).await);
    assert!(matches!(selector.pick(&[]), Err(SelectError::NoAvailableService)));

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_peers() {
    let healthy = Arc::new(AtomicBool::new(true));
    let failures = Arc::new(AtomicUsize::new(0));
    let (h, f) = (healthy.clone(), failures.clone());
    let body = listing(&[service("Arith-1", "tcp@10.0.0.1:8972", None)]);
    let addr = common::start_mock_registry(move |_| {
        if h.load(Ordering::SeqCst) {
            (200, body.clone())
        } else {
            f.fetch_add(1, Ordering::SeqCst);
            (503, "agent down".to_string())
        }
    })
    .await;

    let selector = ConsulSelector::connect(config(addr, 50), SelectMode::RoundRobin, Duration::from_secs(1))
        .await
        .unwrap();
    healthy.store(false, Ordering::SeqCst);

    assert!(common::wait_until(Duration::from_secs(3), || failures.load(Ordering::SeqCst) >= 2).await);
    assert_eq!(selector.peers().len(), 1);
    assert_eq!(selector.pick(&[]).unwrap().address, "10.0.0.1:8972");

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_unreachable_agent_starts_empty_then_recovers() {
    let up = Arc::new(AtomicBool::new(false));
    let flag = up.clone();
    let body = listing(&[service("Arith-1", "tcp@10.0.0.1:8972", None)]);
    let addr = common::start_mock_registry(move |_| {
        if flag.load(Ordering::SeqCst) {
            (200, body.clone())
        } else {
            (500, String::new())
        }
    })
    .await;

    let selector = ConsulSelector::connect(config(addr, 50), SelectMode::RandomSelect, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(selector.peers().is_empty());

    up.store(true, Ordering::SeqCst);
    assert!(common::wait_until(Duration::from_secs(3), || selector.peers().len() == 1).await);

    selector.stop_and_wait().await;
}

#[tokio::test]
async fn test_shutdown_stops_polling() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = common::start_mock_registry(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        (200, "{}".to_string())
    })
    .await;

    let selector = ConsulSelector::connect(config(addr, 20), SelectMode::RandomSelect, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(common::wait_until(Duration::from_secs(3), || hits.load(Ordering::SeqCst) >= 3).await);

    selector.shutdown();
    selector.shutdown();
    selector.stop_and_wait().await;

    let after_stop = hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.load(Ordering::SeqCst), after_stop);
}
