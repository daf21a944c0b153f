//! Process-wide TTL caching.
//!
//! [`TtlCache`] is an explicit cache object: constructed once per process,
//! shared by reference (`Arc`), no teardown. Entries carry their own
//! time-to-live; an expired entry is treated as absent and it is the
//! caller's job to reload and re-insert. Concurrent inserts for the same
//! key are benign - the last writer wins, and values are immutable per key
//! until expiry.
//!
//! There is no eviction beyond TTL and no capacity bound: the key space
//! (event types, source ids) is small and operator-controlled.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Converts a lock poison error to an internal error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("lock poisoned")
}

/// A single cached value with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheItem<T> {
    /// The cached value.
    pub data: T,
    /// How long the value stays fresh after insertion.
    pub ttl: Duration,
    /// When the value was inserted.
    pub inserted_at: Instant,
}

impl<T> CacheItem<T> {
    /// Creates an item inserted now.
    #[must_use]
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            ttl,
            inserted_at: Instant::now(),
        }
    }

    /// Creates an item with an explicit insertion instant.
    ///
    /// Useful in tests to fabricate already-expired entries.
    #[must_use]
    pub const fn inserted_at(data: T, ttl: Duration, inserted_at: Instant) -> Self {
        Self {
            data,
            ttl,
            inserted_at,
        }
    }

    /// Returns true when the item has outlived its TTL at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe string-keyed cache with per-entry TTL.
///
/// Values must be `Clone`; cache hits hand out clones so readers never hold
/// the lock across await points. Wrap expensive values in `Arc`.
#[derive(Debug, Default)]
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheItem<T>>>,
}

impl<T: Clone> TtlCache<T> {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the fresh value for `key`, or `None` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        self.get_at(key, Instant::now())
    }

    /// Returns the value for `key` judged against an explicit `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get_at(&self, key: &str, now: Instant) -> Result<Option<T>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries
            .get(key)
            .filter(|item| !item.is_expired_at(now))
            .map(|item| item.data.clone()))
    }

    /// Inserts a value with the given TTL, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert(&self, key: impl Into<String>, data: T, ttl: Duration) -> Result<()> {
        self.insert_item(key, CacheItem::new(data, ttl))
    }

    /// Inserts a pre-built item, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_item(&self, key: impl Into<String>, item: CacheItem<T>) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert(key.into(), item);
        Ok(())
    }

    /// Removes expired entries and returns how many were dropped.
    ///
    /// Purging is optional housekeeping; lookups already treat expired
    /// entries as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poison_err)?;
        let before = entries.len();
        entries.retain(|_, item| !item.is_expired_at(now));
        Ok(before - entries.len())
    }

    /// Returns the number of entries, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.len())
    }

    /// Returns true when the cache holds no entries at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn fresh_entries_are_returned() {
        let cache = TtlCache::new();
        cache.insert("page_view", 7_u32, TTL).unwrap();
        assert_eq!(cache.get("page_view").unwrap(), Some(7));
    }

    #[test]
    fn missing_keys_are_none() {
        let cache: TtlCache<u32> = TtlCache::new();
        assert_eq!(cache.get("absent").unwrap(), None);
    }

    #[test]
    fn expired_entries_are_treated_as_absent() {
        let cache = TtlCache::new();
        let inserted = Instant::now();
        cache
            .insert_item("k", CacheItem::inserted_at(1_u32, TTL, inserted))
            .unwrap();

        let fresh = cache
            .get_at("k", inserted + Duration::from_secs(59))
            .unwrap();
        assert_eq!(fresh, Some(1));
        assert_eq!(cache.get_at("k", inserted + TTL).unwrap(), None);
    }

    #[test]
    fn last_writer_wins() {
        let cache = TtlCache::new();
        cache.insert("k", 1_u32, TTL).unwrap();
        cache.insert("k", 2_u32, TTL).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(2));
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let cache = TtlCache::new();
        // Zero TTL expires immediately.
        cache.insert("stale", 1_u32, Duration::ZERO).unwrap();
        cache.insert("fresh", 2_u32, TTL).unwrap();

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("fresh").unwrap(), Some(2));
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let cache: TtlCache<u32> = TtlCache::new();
        let poison = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.entries.write().unwrap();
            panic!("poison the cache lock");
        }));
        assert!(poison.is_err());

        assert!(cache.get("k").is_err());
        assert!(cache.insert("k", 1, TTL).is_err());
        assert!(cache.len().is_err());
    }
}
