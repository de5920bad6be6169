//! Lookup orchestration: validate, consult the cache, assemble the answer.

use std::sync::Arc;

use serde::Serialize;

use crate::config::PwnedConfig;
use crate::observability::metrics;
use crate::range::cache::RangeCache;
use crate::range::error::{LookupError, UpstreamResult};
use crate::range::fetcher::HttpRangeFetcher;
use crate::range::parser::SuffixRecord;
use crate::range::prefix::PrefixKey;
use crate::range::store::{CacheStore, MemoryStore};

/// Answer for a successful lookup. Serializes to the public response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupOutcome {
    pub prefix: PrefixKey,
    pub results: Vec<SuffixRecord>,
    pub cache_hit: bool,
}

/// Entry point for breach-range lookups.
pub struct PwnedRangeService {
    cache: RangeCache,
}

impl PwnedRangeService {
    pub fn new(cache: RangeCache) -> Self {
        Self { cache }
    }

    /// Wire the HTTP fetcher and the given store together from config.
    pub fn from_config(config: &PwnedConfig, store: Arc<dyn CacheStore>) -> UpstreamResult<Self> {
        let fetcher = HttpRangeFetcher::new(&config.upstream, &config.retries)?;
        Ok(Self::new(RangeCache::new(store, Arc::new(fetcher), &config.cache)))
    }

    /// Like [`Self::from_config`] with a fresh in-process store, also returned
    /// so the caller can run its sweeper.
    pub fn with_memory_store(config: &PwnedConfig) -> UpstreamResult<(Self, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        let service = Self::from_config(config, store.clone())?;
        Ok((service, store))
    }

    /// Look up all suffixes for a candidate prefix.
    ///
    /// Malformed input is rejected before the cache or upstream is touched.
    pub async fn lookup(&self, raw_prefix: &str) -> Result<LookupOutcome, LookupError> {
        let prefix = PrefixKey::parse(raw_prefix).inspect_err(|_| {
            metrics::record_lookup("invalid_prefix");
        })?;

        let (range, cache_hit) = self.cache.get_or_fetch(&prefix).await.map_err(|e| {
            tracing::error!(prefix = %prefix, error = %e, "Range lookup failed");
            metrics::record_lookup("upstream_unavailable");
            LookupError::UpstreamUnavailable(e.failure())
        })?;

        metrics::record_lookup(if cache_hit { "cache_hit" } else { "fetched" });
        tracing::info!(prefix = %prefix, cache_hit, records = range.records.len(), "Range lookup");

        Ok(LookupOutcome {
            prefix: range.prefix,
            results: range.records,
            cache_hit,
        })
    }
}
