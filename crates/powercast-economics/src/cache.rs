//! Time-bounded memoization of expensive results
//!
//! Entries expire `ttl` after they are stored. Time is always passed in by the
//! caller so expiry is deterministic under test. Values are computed outside
//! the lock; two callers missing the same key may both compute, and the last
//! one to finish wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug)]
struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: DateTime<Utc>,
}

/// Hit and miss counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub entries: usize,
}

/// Keyed results with a fixed time-to-live
#[derive(Debug)]
pub struct MemoizedCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

impl<K, V> MemoizedCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Unexpired value for `key`
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<Arc<V>> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value`, replacing any previous entry
    pub fn set(&self, key: K, value: V, now: DateTime<Utc>) -> Arc<V> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            value: Arc::clone(&value),
            expires_at: now + self.ttl,
        };
        self.entries.write().insert(key, entry);
        value
    }

    /// Cached value, or the result of `compute` stored under `key`.
    ///
    /// `must_refresh` skips the lookup. A failed computation leaves the cache
    /// untouched.
    pub fn get_or_compute<F>(&self, key: &K, now: DateTime<Utc>, must_refresh: bool, compute: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if !must_refresh {
            if let Some(value) = self.get(key, now) {
                return Ok(value);
            }
        }

        let value = compute()?;
        self.computations.fetch_add(1, Ordering::Relaxed);
        Ok(self.set(key.clone(), value, now))
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache: MemoizedCache<u32, String> = MemoizedCache::new(Duration::minutes(30));
        let first = cache
            .get_or_compute(&1, t0(), false, || Ok("a".to_string()))
            .unwrap();
        let second = cache
            .get_or_compute(&1, t0() + Duration::minutes(29), false, || Ok("b".to_string()))
            .unwrap();

        assert_eq!(*second, "a");
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_expiry_recomputes() {
        let cache: MemoizedCache<u32, u32> = MemoizedCache::new(Duration::minutes(30));
        cache.set(1, 10, t0());
        assert!(cache.get(&1, t0() + Duration::minutes(30)).is_none());

        let value = cache
            .get_or_compute(&1, t0() + Duration::hours(1), false, || Ok(20))
            .unwrap();
        assert_eq!(*value, 20);
    }

    #[test]
    fn test_must_refresh_bypasses_entry() {
        let cache: MemoizedCache<&str, u32> = MemoizedCache::new(Duration::hours(2));
        cache.set("k", 1, t0());
        let value = cache.get_or_compute(&"k", t0(), true, || Ok(2)).unwrap();
        assert_eq!(*value, 2);
        assert_eq!(*cache.get(&"k", t0()).unwrap(), 2);
    }

    #[test]
    fn test_failed_compute_keeps_old_entry() {
        let cache: MemoizedCache<u8, u32> = MemoizedCache::new(Duration::hours(2));
        cache.set(0, 7, t0());
        let result = cache.get_or_compute(&0, t0(), true, || Err(ForecastError::Upstream("down".into())));
        assert!(result.is_err());
        assert_eq!(*cache.get(&0, t0()).unwrap(), 7);
    }

    #[test]
    fn test_purge_and_invalidate() {
        let cache: MemoizedCache<u32, u32> = MemoizedCache::new(Duration::minutes(10));
        cache.set(1, 1, t0());
        cache.set(2, 2, t0() + Duration::minutes(5));
        assert_eq!(cache.purge_expired(t0() + Duration::minutes(12)), 1);
        assert_eq!(cache.stats().entries, 1);
        assert!(cache.invalidate(&2));
        assert!(!cache.invalidate(&2));
    }
}
