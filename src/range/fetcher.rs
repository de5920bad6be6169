//! Upstream range fetcher.
//!
//! # Responsibilities
//! - Query `{base_url}/range/{prefix}` with a fixed User-Agent
//! - Retry rate-limited attempts with doubling backoff
//! - Fail fast on every other error
//!
//! One client is built up front and reused by every attempt and lookup.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::{RetryConfig, UpstreamConfig};
use crate::observability::metrics;
use crate::range::error::{UpstreamError, UpstreamResult};
use crate::range::parser::{parse_range, SuffixRecord};
use crate::range::prefix::PrefixKey;
use crate::resilience::retries::{is_retryable, RetryPolicy};

/// Source of suffix records for a prefix.
#[async_trait]
pub trait RangeFetcher: Send + Sync + 'static {
    async fn fetch(&self, prefix: &PrefixKey) -> UpstreamResult<Vec<SuffixRecord>>;
}

/// Fetches ranges from the breach-data provider over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpRangeFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new(upstream: &UpstreamConfig, retries: &RetryConfig) -> UpstreamResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(upstream.user_agent.as_str())
            .timeout(Duration::from_secs(upstream.timeout_secs))
            .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs));
        if !upstream.use_env_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(UpstreamError::Client)?;

        Ok(Self::with_client(client, &upstream.base_url, RetryPolicy::from(retries)))
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client, base_url: &str, policy: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    fn range_url(&self, prefix: &PrefixKey) -> String {
        format!("{}/range/{}", self.base_url, prefix)
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    /// Fetch and parse the range for `prefix`.
    ///
    /// A 429 sleeps `delay_after(attempt)` (base, 2x base, ...) and tries
    /// again. Once `max_attempts` have all been rate limited the call fails
    /// straight away; there is no sleep after the final attempt, so the
    /// defaults wait 1s + 2s in total before giving up.
    async fn fetch(&self, prefix: &PrefixKey) -> UpstreamResult<Vec<SuffixRecord>> {
        let url = self.range_url(prefix);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            let response = self.client.get(&url).send().await.map_err(|e| {
                tracing::error!(prefix = %prefix, attempt, error = %e, "Upstream request failed");
                UpstreamError::Transport(e)
            })?;

            let status = response.status();
            metrics::record_upstream_response(status.as_u16(), start);

            if status.is_success() {
                let body = response.text().await?;
                let records = parse_range(&body).map_err(|e| {
                    tracing::error!(prefix = %prefix, error = %e, "Malformed upstream range");
                    UpstreamError::Malformed(e)
                })?;
                tracing::debug!(prefix = %prefix, attempt, records = records.len(), "Fetched range");
                return Ok(records);
            }

            if !is_retryable(status) {
                tracing::error!(prefix = %prefix, status = %status, "Upstream error");
                return Err(UpstreamError::Status(status.as_u16()));
            }

            if !self.policy.allows_another(attempt) {
                tracing::warn!(prefix = %prefix, attempts = attempt, "Upstream rate limit retries exhausted");
                return Err(UpstreamError::RateLimitExhausted { attempts: attempt });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(prefix = %prefix, attempt, delay = ?delay, "Upstream rate limited, backing off");
            metrics::record_upstream_retry();
            tokio::time::sleep(delay).await;
        }
    }
}
