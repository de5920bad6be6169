//! End-to-end lookups through the HTTP server against a mock upstream.

use std::net::SocketAddr;
use std::time::Duration;

use pwned_range_proxy::config::PwnedConfig;
use pwned_range_proxy::http::HttpServer;
use pwned_range_proxy::lifecycle::Shutdown;
use serde_json::{json, Value};

mod common;

async fn start_proxy(config: PwnedConfig) -> (SocketAddr, Shutdown) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn lookup(proxy: SocketAddr, prefix: &str) -> reqwest::Response {
    client()
        .post(format!("http://{}/api/v1/pwned-range", proxy))
        .json(&json!({ "prefix": prefix }))
        .send()
        .await
        .expect("proxy unreachable")
}

#[tokio::test]
async fn test_miss_then_cached_hit() {
    let (upstream, seen) =
        common::start_fixed_upstream(200, "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF:5\n").await;
    let (proxy, shutdown) = start_proxy(common::config_for(upstream)).await;

    let res = lookup(proxy, "abcde").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "prefix": "ABCDE",
            "results": [{"suffix": "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF", "count": 5}],
            "cache_hit": false
        })
    );

    let res = lookup(proxy, "abcde").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["cache_hit"], true);
    assert_eq!(body["results"][0]["count"], 5);

    assert_eq!(seen.count(), 1, "second lookup must not reach upstream");
    assert!(seen.heads()[0].starts_with("GET /range/ABCDE "));

    shutdown.trigger();
}

#[tokio::test]
async fn test_invalid_prefix_never_reaches_upstream() {
    let (upstream, seen) = common::start_fixed_upstream(200, "AAAA:1\n").await;
    let (proxy, shutdown) = start_proxy(common::config_for(upstream)).await;

    let res = lookup(proxy, "xyz12").await;
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "prefix must be 5 hex characters");

    let res = lookup(proxy, "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8").await;
    assert_eq!(res.status(), 400);

    assert_eq!(seen.count(), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limited_upstream_is_service_unavailable() {
    let (upstream, seen) = common::start_fixed_upstream(429, "slow down").await;
    let mut config = common::config_for(upstream);
    config.retries.base_delay_ms = 10;
    let (proxy, shutdown) = start_proxy(config).await;

    let res = lookup(proxy, "ABCDE").await;
    assert_eq!(res.status(), 503);
    assert!(res.headers().contains_key("retry-after"));
    let body: Value = res.json().await.unwrap();
    assert!(!body["detail"].as_str().unwrap().contains("429"));
    assert_eq!(seen.count(), 3);

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_error_is_bad_gateway_and_not_cached() {
    let (upstream, seen) = common::start_programmable_upstream(|call| async move {
        if call == 0 {
            (500, "boom".to_string())
        } else {
            (200, "AAAA:1\n".to_string())
        }
    })
    .await;
    let (proxy, shutdown) = start_proxy(common::config_for(upstream)).await;

    let res = lookup(proxy, "ABCDE").await;
    assert_eq!(res.status(), 502);

    let res = lookup(proxy, "ABCDE").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["cache_hit"], false);
    assert_eq!(seen.count(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let (upstream, seen) = common::start_programmable_upstream(|_| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        (200, "AAAA:1\n".to_string())
    })
    .await;
    let (proxy, shutdown) = start_proxy(common::config_for(upstream)).await;

    let requests = (0..5).map(|_| async move { lookup(proxy, "0A0A0").await.status() });
    let statuses = futures_util::future::join_all(requests).await;

    assert!(statuses.iter().all(|s| *s == 200));
    assert_eq!(seen.count(), 1);

    shutdown.trigger();
}

async fn start_stalled_upstream() -> (SocketAddr, common::Seen) {
    common::start_programmable_upstream(|_| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        (200, "AAAA:1\n".to_string())
    })
    .await
}

#[tokio::test]
async fn test_request_deadline_is_gateway_timeout() {
    let (upstream, _) = start_stalled_upstream().await;
    let mut config = common::config_for(upstream);
    config.timeouts.request_secs = 1;
    let (proxy, shutdown) = start_proxy(config).await;

    let res = lookup(proxy, "ABCDE").await;
    assert_eq!(res.status(), 504);
    assert!(res.status().is_server_error());

    shutdown.trigger();
}

#[tokio::test]
async fn test_stalled_upstream_fails_every_caller_with_server_error() {
    let (upstream, seen) = start_stalled_upstream().await;
    let mut config = common::config_for(upstream);
    config.upstream.timeout_secs = 1;
    config.timeouts.request_secs = 2;
    let (proxy, shutdown) = start_proxy(config).await;

    let requests = (0..4).map(|_| async move { lookup(proxy, "ABCDE").await.status() });
    let statuses = futures_util::future::join_all(requests).await;

    assert!(statuses.iter().all(|s| s.is_server_error()), "{:?}", statuses);
    assert!(statuses.iter().all(|s| *s == 502), "{:?}", statuses);
    assert_eq!(seen.count(), 1, "queued callers must reuse the failed fetch");

    shutdown.trigger();
}

#[tokio::test]
async fn test_inbound_rate_limit() {
    let (upstream, _) = common::start_fixed_upstream(200, "AAAA:1\n").await;
    let mut config = common::config_for(upstream);
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 2;
    let (proxy, shutdown) = start_proxy(config).await;

    assert_eq!(lookup(proxy, "ABCDE").await.status(), 200);
    assert_eq!(lookup(proxy, "ABCDE").await.status(), 200);
    assert_eq!(lookup(proxy, "ABCDE").await.status(), 429);

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_endpoint() {
    let (upstream, _) = common::start_fixed_upstream(200, "").await;
    let (proxy, shutdown) = start_proxy(common::config_for(upstream)).await;

    let res = client().get(format!("http://{}/health", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"status": "ok"}));

    shutdown.trigger();
}
