//! TTL-keyed store with lazy expiry and per-key single-flight computation.
//!
//! Entries record when they were stored and for how long they stay fresh; nothing is
//! evicted in the background, owners call [`TtlCache::purge_expired`] when stale values
//! are of no further use. [`TtlCache::get`] ignores expiry so a refresh loop can keep
//! serving the last good value while a source is failing, whereas
//! [`TtlCache::get_or_compute`] only returns fresh entries.
//!
//! Timestamps use [`tokio::time::Instant`], so a paused test clock drives expiry.

use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;

pub mod refresh;
pub mod ttl;

pub use refresh::{ContextRefresher, ContextStore, RefreshConfig, RefreshHandle};
pub use ttl::TtlSchedule;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<FnvHashMap<SmolStr, CacheEntry<V>>>,
    in_flight: Mutex<FnvHashMap<SmolStr, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(FnvHashMap::default()),
            in_flight: Mutex::new(FnvHashMap::default()),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone,
{
    /// Last stored value regardless of expiry.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    /// Stored value only while it is within its TTL.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone())
    }

    /// Time since `key` was last stored.
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.entries.read().get(key).map(CacheEntry::age)
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        self.entries.write().insert(
            SmolStr::new(key),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove `key`, or every entry when `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.write();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    /// Drop every entry past its TTL, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Return the fresh value for `key`, or run `compute` and store its result for `ttl`.
    ///
    /// Concurrent misses on the same key are collapsed: one caller computes while the
    /// others wait and then read its result. Errors are returned to the computing caller
    /// and nothing is stored.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get_fresh(key) {
            return Ok(value);
        }

        let gate = Arc::clone(
            self.in_flight
                .lock()
                .entry(SmolStr::new(key))
                .or_default(),
        );

        let result = {
            let _guard = gate.lock().await;
            match self.get_fresh(key) {
                Some(value) => Ok(value),
                None => compute().await.inspect(|value| self.set(key, value.clone(), ttl)),
            }
        };

        // Map plus this caller: nobody else is waiting on the gate
        let mut in_flight = self.in_flight.lock();
        if Arc::strong_count(&gate) == 2 {
            in_flight.remove(key);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_respects_ttl() {
        let cache = TtlCache::default();
        let calls = &AtomicUsize::new(0);
        let compute = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(42)
        };

        let ttl = Duration::from_secs(5);
        assert_eq!(cache.get_or_compute("k", ttl, compute).await, Ok(42));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get_or_compute("k", ttl, compute).await, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get_or_compute("k", ttl, compute).await, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_ignores_expiry_but_get_fresh_does_not() {
        let cache = TtlCache::default();
        cache.set("vix", 14.5, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get("vix"), Some(14.5));
        assert_eq!(cache.get_fresh("vix"), None);
        assert_eq!(cache.age("vix"), Some(Duration::from_secs(31)));

        cache.set("news", 0.2, Duration::from_secs(60));
        cache.clear(Some("vix"));
        assert_eq!(cache.get("vix"), None);
        assert_eq!(cache.len(), 1);

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_fresh_entries() {
        let cache = TtlCache::default();
        cache.set("sector_NIFTY_BUY", 0.4, Duration::from_secs(30));
        cache.set("sector_NIFTY_SELL", -0.2, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(20)).await;
        cache.set("sector_INFY_WAIT", 0.0, Duration::from_secs(30));
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("sector_INFY_WAIT"), Some(0.0));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = TtlCache::<u32>::default();
        let ttl = Duration::from_secs(60);

        let failed = cache.get_or_compute("sector", ttl, || async { Err("HTTP 503") }).await;
        assert_eq!(failed, Err("HTTP 503"));
        assert_eq!(cache.get("sector"), None);

        let ok = cache.get_or_compute("sector", ttl, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_compute_once() {
        let cache = Arc::new(TtlCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute("sector_NIFTY_BUY", Duration::from_secs(30), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, ()>(0.4)
                    })
                    .await
            })
        });

        for task in futures::future::join_all(tasks).await {
            assert_eq!(task.unwrap(), Ok(0.4));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().is_empty());
    }
}
