//! Per-client rate limiting middleware.
//!
//! Buckets are created on first sight of a client and dropped by a
//! periodic sweep once they have refilled completely, so the map only
//! holds clients that were active within roughly `burst / rps` seconds.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::http::response::error_response;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// True once the bucket would be back at capacity, i.e. the client is idle.
    fn is_full(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

/// Buckets keyed by client IP.
pub struct RateLimiterState {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    rps: f64,
    burst: f64,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps: config.requests_per_second as f64,
            burst: config.burst_size as f64,
        }
    }

    /// Take one token for `client`; false when it has none left.
    pub fn check(&self, client: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.burst));

        bucket.try_acquire(self.burst, self.rps)
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Drop buckets of clients that have fully refilled. Returns how many went.
    pub fn purge_idle(&self) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full(now, self.burst, self.rps));
        before - buckets.len()
    }

    /// Run [`Self::purge_idle`] every `interval` until shutdown fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = self.purge_idle();
                        if purged > 0 {
                            tracing::debug!(purged, tracked = self.tracked_clients(), "Dropped idle rate limit buckets");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = addr.ip();

    if state.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        error_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: u32, burst: u32) -> RateLimiterState {
        RateLimiterState::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst_size: burst,
            sweep_interval_secs: 60,
        })
    }

    #[test]
    fn test_burst_then_reject() {
        let state = limiter(1, 3);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(state.check(ip));
        assert!(state.check(ip));
        assert!(state.check(ip));
        assert!(!state.check(ip));
    }

    #[test]
    fn test_clients_are_independent() {
        let state = limiter(1, 1);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(state.check(a));
        assert!(!state.check(a));
        assert!(state.check(b));
        assert_eq!(state.tracked_clients(), 2);
    }

    #[test]
    fn test_refill() {
        let state = limiter(1000, 1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(state.check(ip));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(state.check(ip));
    }

    #[test]
    fn test_idle_buckets_are_purged() {
        let state = limiter(1000, 1);
        let idle: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(state.check(idle));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(state.purge_idle(), 1);
        assert_eq!(state.tracked_clients(), 0);

        // Evicted clients start over with a full burst
        assert!(state.check(idle));
    }

    #[test]
    fn test_active_buckets_survive_purge() {
        let state = limiter(1, 3);
        let busy: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(state.check(busy));
        assert!(state.check(busy));

        assert_eq!(state.purge_idle(), 0);
        assert_eq!(state.tracked_clients(), 1);
        assert!(state.check(busy));
        assert!(!state.check(busy));
    }

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops_on_shutdown() {
        let state = Arc::new(limiter(1000, 1));
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        assert!(state.check(ip));

        let (tx, rx) = broadcast::channel(1);
        let handle = state.clone().spawn_sweeper(Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.tracked_clients(), 0);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
