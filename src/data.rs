//! Market data seams
//!
//! Detection and simulation never fetch data themselves. A caller fetches bars
//! through a [`MarketDataProvider`], optionally behind a [`BarCache`], and
//! hands the resulting [`CandleSeries`] to the core.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{metrics::CandleSeries, Bar, Result};

/// Bars for one symbol and interval over an inclusive time range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarRequest {
    pub symbol: String,
    /// Vendor interval code, e.g. `"5m"` or `"1d"`
    pub interval: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl BarRequest {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            start,
            end,
        }
    }
}

/// Source of historical bars.
///
/// Implement once per vendor. Failures should be reported as
/// [`Error::DataSource`](crate::Error::DataSource).
pub trait MarketDataProvider: Send + Sync {
    fn fetch(&self, request: &BarRequest) -> Result<Vec<Bar>>;
}

/// Store of previously fetched bars
pub trait BarCache: Send + Sync {
    fn get(&self, request: &BarRequest) -> Option<Vec<Bar>>;

    fn set(&self, request: BarRequest, bars: Vec<Bar>);

    /// Drop one entry. Returns whether it was present.
    fn evict(&self, request: &BarRequest) -> bool;
}

// ============================================================
// IN-MEMORY CACHE
// ============================================================

/// Default number of requests held by [`InMemoryBarCache`]
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

#[derive(Debug)]
struct CacheEntry {
    bars: Vec<Bar>,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<BarRequest, CacheEntry>,
    /// Keys oldest insertion first
    order: VecDeque<BarRequest>,
}

impl CacheState {
    fn remove(&mut self, request: &BarRequest) -> bool {
        if self.entries.remove(request).is_none() {
            return false;
        }
        self.order.retain(|k| k != request);
        true
    }
}

/// Bounded cache with a time to live. When full, the least recently
/// inserted entry is dropped.
#[derive(Debug)]
pub struct InMemoryBarCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl InMemoryBarCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// [`DEFAULT_CACHE_CAPACITY`] entries, each kept for `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, ttl)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // entries stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BarCache for InMemoryBarCache {
    fn get(&self, request: &BarRequest) -> Option<Vec<Bar>> {
        let mut state = self.lock();
        let expired = state.entries.get(request)?.inserted.elapsed() >= self.ttl;
        if expired {
            state.remove(request);
            debug!(symbol = %request.symbol, "cache entry expired");
            return None;
        }
        state.entries.get(request).map(|e| e.bars.clone())
    }

    fn set(&self, request: BarRequest, bars: Vec<Bar>) {
        let mut state = self.lock();
        state.remove(&request);
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            debug!(symbol = %oldest.symbol, "cache full, evicted oldest entry");
        }
        state.order.push_back(request.clone());
        state.entries.insert(
            request,
            CacheEntry {
                bars,
                inserted: Instant::now(),
            },
        );
    }

    fn evict(&self, request: &BarRequest) -> bool {
        self.lock().remove(request)
    }
}

// ============================================================
// CACHED PROVIDER
// ============================================================

/// A provider consulted only when the cache misses
#[derive(Debug)]
pub struct CachedProvider<P, C> {
    provider: P,
    cache: C,
}

impl<P: MarketDataProvider, C: BarCache> CachedProvider<P, C> {
    pub fn new(provider: P, cache: C) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Fetch and validate into a series ready for detection
    pub fn fetch_series(&self, request: &BarRequest) -> Result<CandleSeries> {
        CandleSeries::new(self.fetch(request)?)
    }
}

impl<P: MarketDataProvider, C: BarCache> MarketDataProvider for CachedProvider<P, C> {
    fn fetch(&self, request: &BarRequest) -> Result<Vec<Bar>> {
        if let Some(bars) = self.cache.get(request) {
            debug!(symbol = %request.symbol, interval = %request.interval, "cache hit");
            return Ok(bars);
        }
        debug!(symbol = %request.symbol, interval = %request.interval, "cache miss");
        let bars = self.provider.fetch(request)?;
        self.cache.set(request.clone(), bars.clone());
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ts(day: i64) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 4, 1, 9, 30, 0)
            .unwrap()
            + ChronoDuration::days(day)
    }

    fn request(symbol: &str) -> BarRequest {
        BarRequest::new(symbol, "1d", ts(0), ts(10))
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl MarketDataProvider for CountingProvider {
        fn fetch(&self, request: &BarRequest) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.symbol == "MISSING" {
                return Err(Error::DataSource {
                    symbol: request.symbol.clone(),
                    reason: "no data".into(),
                });
            }
            Ok((0..3)
                .map(|i| Bar::new(ts(i), 10.0, 11.0, 9.0, 10.5))
                .collect())
        }
    }

    #[test]
    fn test_cache_get_set_evict() {
        let cache = InMemoryBarCache::with_ttl(Duration::from_secs(60));
        assert!(cache.get(&request("AAPL")).is_none());

        cache.set(request("AAPL"), vec![Bar::new(ts(0), 1.0, 2.0, 0.5, 1.5)]);
        assert_eq!(cache.get(&request("AAPL")).map(|b| b.len()), Some(1));
        assert!(cache.evict(&request("AAPL")));
        assert!(!cache.evict(&request("AAPL")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_least_recently_inserted() {
        let cache = InMemoryBarCache::new(2, Duration::from_secs(60));
        cache.set(request("A"), Vec::new());
        cache.set(request("B"), Vec::new());
        // reading does not refresh insertion order
        assert!(cache.get(&request("A")).is_some());
        cache.set(request("C"), Vec::new());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&request("A")).is_none());
        assert!(cache.get(&request("B")).is_some());
        assert!(cache.get(&request("C")).is_some());
    }

    #[test]
    fn test_cache_expires_entries() {
        let cache = InMemoryBarCache::with_ttl(Duration::ZERO);
        cache.set(request("AAPL"), Vec::new());
        assert!(cache.get(&request("AAPL")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_provider_hits_cache() {
        let cached = CachedProvider::new(
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
            InMemoryBarCache::with_ttl(Duration::from_secs(60)),
        );
        let series = cached.fetch_series(&request("MSFT")).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(cached.fetch(&request("MSFT")).unwrap().len(), 3);
        assert_eq!(cached.provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cache().len(), 1);
    }

    #[test]
    fn test_provider_errors_are_not_cached() {
        let cached = CachedProvider::new(
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
            InMemoryBarCache::with_ttl(Duration::from_secs(60)),
        );
        for _ in 0..2 {
            let err = cached.fetch(&request("MISSING")).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidData);
        }
        assert_eq!(cached.provider.calls.load(Ordering::SeqCst), 2);
        assert!(cached.cache().is_empty());
    }
}
