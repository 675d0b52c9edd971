//! Memoization cache for expensive lookups.
//!
//! Entries are keyed by the argument value of the memoized computation. A
//! per-key lock makes sure concurrent first callers compute a value once,
//! while readers of an already cached entry never touch that lock.
//!
//! # Example
//!
//! ```
//! use navi_common::MemoCache;
//!
//! let cache: MemoCache<&str, usize> = MemoCache::new();
//! assert_eq!(cache.get_or_insert_with("navi", || 4), 4);
//! // cached, the closure is not called again
//! assert_eq!(cache.get_or_insert_with("navi", || unreachable!()), 4);
//! ```

use mini_moka::sync::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe memoization cache with optional time-based eviction.
///
/// Storage and expiry are handled by [`mini_moka::sync::Cache`]; the per-key
/// locks only serialize the compute path of a missing entry.
pub struct MemoCache<K, V> {
    entries: Cache<K, V>,
    key_locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
    ttl: Option<Duration>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose entries never expire.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
            key_locks: Mutex::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Creates a cache whose entries are evicted `ttl` after insertion.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
            key_locks: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the cached value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key)
    }

    /// Returns the cached value or computes, stores and returns it.
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.get_or_try_insert_with(key, || Ok::<V, std::convert::Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with).
    ///
    /// Errors are returned to the caller and nothing is cached.
    pub fn get_or_try_insert_with<F, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value);
        }

        let key_lock = self.key_lock(&key);
        let _guard = key_lock.lock();

        // Another caller may have filled the entry while we waited
        if let Some(value) = self.entries.get(&key) {
            return Ok(value);
        }

        let value = compute()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    /// Drops the entry for `key`, forcing the next lookup to recompute.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let previous = self.entries.get(key);
        self.entries.invalidate(key);
        self.key_locks.lock().remove(key);
        previous
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.key_locks.lock().clear();
    }

    fn key_lock(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock();
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
