//! TTL cache in front of the range fetcher.
//!
//! # Data Flow
//! ```text
//! get_or_fetch(prefix)
//!     → store.get("<namespace><prefix>")
//!         hit + decodes      → (result, true)
//!         miss / corrupted   → [single-flight slot] → fetcher.fetch
//!                            → store.set_ex(payload, ttl) → (result, false)
//! ```
//!
//! Store faults never fail a lookup: a bad read is a miss and a failed
//! write only costs the next request a refetch.
//!
//! Callers queued on a slot whose fetch fails get that failure back
//! instead of running their own retry sequence against the provider.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::range::error::{CacheFault, UpstreamError, UpstreamFailure, UpstreamResult};
use crate::range::fetcher::RangeFetcher;
use crate::range::parser::SuffixRecord;
use crate::range::prefix::PrefixKey;
use crate::range::store::CacheStore;

/// All suffixes known for one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResult {
    pub prefix: PrefixKey,
    pub records: Vec<SuffixRecord>,
    /// Unix seconds when the range was fetched upstream.
    pub fetched_at: u64,
}

/// State shared by everyone queued on one prefix.
#[derive(Debug, Default)]
struct Flight {
    /// When the last fetch failed, and how.
    failed: Option<(Instant, UpstreamFailure)>,
}

type InflightMap = DashMap<PrefixKey, Arc<Mutex<Flight>>>;

/// Per-prefix lock handed out to concurrent misses.
///
/// Removes itself from the map when the last holder goes away, including
/// when the owning future is dropped mid-fetch.
struct InflightSlot<'a> {
    map: &'a InflightMap,
    key: PrefixKey,
    lock: Arc<Mutex<Flight>>,
}

impl<'a> InflightSlot<'a> {
    fn acquire(map: &'a InflightMap, key: &PrefixKey) -> Self {
        let lock = map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Flight::default())))
            .clone();
        Self {
            map,
            key: key.clone(),
            lock,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // Two references left means the map and us.
        self.map
            .remove_if(&self.key, |_, lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
    }
}

/// Range cache with injected store and fetcher.
pub struct RangeCache {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn RangeFetcher>,
    key_prefix: String,
    ttl: Duration,
    single_flight: bool,
    inflight: InflightMap,
}

impl RangeCache {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn RangeFetcher>, config: &CacheConfig) -> Self {
        Self {
            store,
            fetcher,
            key_prefix: config.key_prefix.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
            single_flight: config.single_flight,
            inflight: DashMap::new(),
        }
    }

    /// Store key for a prefix.
    pub fn cache_key(&self, prefix: &PrefixKey) -> String {
        format!("{}{}", self.key_prefix, prefix)
    }

    /// Cached range for `prefix`, fetching and storing it on a miss.
    ///
    /// The flag is true when the result came from the store.
    pub async fn get_or_fetch(&self, prefix: &PrefixKey) -> UpstreamResult<(RangeResult, bool)> {
        let key = self.cache_key(prefix);

        if let Some(hit) = self.read_absorbing(prefix).await {
            metrics::record_cache(true);
            return Ok((hit, true));
        }

        if !self.single_flight {
            metrics::record_cache(false);
            return self.fetch_and_store(prefix, &key).await.map(|r| (r, false));
        }

        let slot = InflightSlot::acquire(&self.inflight, prefix);
        let joined = Instant::now();
        let mut flight = slot.lock.lock().await;

        // Failed while we were queued: its answer is ours too.
        if let Some((failed_at, failure)) = flight.failed {
            if failed_at >= joined {
                tracing::debug!(prefix = %prefix, failure = ?failure, "Concurrent fetch failed, sharing outcome");
                return Err(UpstreamError::Coalesced(failure));
            }
        }

        // Whoever held the slot before us may have filled the cache.
        if let Some(hit) = self.read_absorbing(prefix).await {
            tracing::debug!(prefix = %prefix, "Range filled by concurrent fetch");
            metrics::record_cache(true);
            return Ok((hit, true));
        }

        metrics::record_cache(false);
        match self.fetch_and_store(prefix, &key).await {
            Ok(result) => {
                flight.failed = None;
                Ok((result, false))
            }
            Err(e) => {
                flight.failed = Some((Instant::now(), e.failure()));
                Err(e)
            }
        }
    }

    /// Decode the stored entry, if any.
    pub(crate) async fn read(&self, prefix: &PrefixKey) -> Result<Option<RangeResult>, CacheFault> {
        let key = self.cache_key(prefix);
        let Some(raw) = self.store.get(&key).await.map_err(CacheFault::ReadFailed)? else {
            return Ok(None);
        };

        let result: RangeResult = serde_json::from_str(&raw).map_err(|e| CacheFault::Corrupted {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        if &result.prefix != prefix {
            return Err(CacheFault::Corrupted {
                key,
                reason: format!("entry belongs to prefix {}", result.prefix),
            });
        }

        Ok(Some(result))
    }

    async fn read_absorbing(&self, prefix: &PrefixKey) -> Option<RangeResult> {
        match self.read(prefix).await {
            Ok(hit) => hit,
            Err(fault) => {
                tracing::warn!(prefix = %prefix, error = %fault, "Ignoring unreadable cache entry");
                metrics::record_cache_fault(fault.kind());
                None
            }
        }
    }

    async fn fetch_and_store(&self, prefix: &PrefixKey, key: &str) -> UpstreamResult<RangeResult> {
        let records = self.fetcher.fetch(prefix).await?;
        let result = RangeResult {
            prefix: prefix.clone(),
            records,
            fetched_at: unix_now(),
        };

        if let Err(fault) = self.write(key, &result).await {
            tracing::warn!(prefix = %prefix, error = %fault, "Range not cached");
            metrics::record_cache_fault(fault.kind());
        }

        Ok(result)
    }

    async fn write(&self, key: &str, result: &RangeResult) -> Result<(), CacheFault> {
        let payload = serde_json::to_string(result).map_err(|e| CacheFault::Unencodable {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .set_ex(key, payload, self.ttl)
            .await
            .map_err(CacheFault::WriteFailed)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
