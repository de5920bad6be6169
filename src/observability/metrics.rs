//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pwned_lookups_total` (counter): lookups by outcome
//! - `pwned_cache_requests_total` (counter): cache hits and misses
//! - `pwned_cache_faults_total` (counter): absorbed cache problems by kind
//! - `pwned_cache_entries` (gauge): entries held by the in-process store
//! - `pwned_upstream_responses_total` (counter): upstream answers by status
//! - `pwned_upstream_duration_seconds` (histogram): upstream attempt latency
//! - `pwned_upstream_retries_total` (counter): backoff sleeps taken
//! - `pwned_rate_limited_total` (counter): inbound requests rejected
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_lookup(outcome: &'static str) {
    counter!("pwned_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("pwned_cache_requests_total", "result" => result).increment(1);
}

pub fn record_cache_fault(kind: &'static str) {
    counter!("pwned_cache_faults_total", "kind" => kind).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("pwned_cache_entries").set(entries as f64);
}

pub fn record_upstream_response(status: u16, start: Instant) {
    counter!("pwned_upstream_responses_total", "status" => status.to_string()).increment(1);
    histogram!("pwned_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_retry() {
    counter!("pwned_upstream_retries_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("pwned_rate_limited_total").increment(1);
}
