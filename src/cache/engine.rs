//! Cache Engine Module
//!
//! Public cache contract layered over the entry store and expiration policy.

use std::any::{type_name, Any};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::expiry;
use crate::cache::{CacheEntry, CacheStats, CachedValue, EntryStore, KeyPattern, StatsRecorder};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Local Cache ==
/// In-process key/value cache with per-entry TTL and sliding expiration.
///
/// Cloning is cheap and every clone shares the same store, so a handle can
/// be moved into background tasks.
///
/// # Example
/// ```
/// use slidecache::LocalCache;
/// use std::time::Duration;
///
/// let cache = LocalCache::new();
/// cache.set_with_ttl("user:1", 42u64, Duration::from_secs(60)).unwrap();
/// assert_eq!(cache.get::<u64>("user:1").unwrap(), Some(42));
/// assert_eq!(cache.get::<u64>("user:2").unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct LocalCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    store: EntryStore,
    stats: StatsRecorder,
    debug_log: bool,
}

/// Outcome of a read-and-refresh performed under the entry lock.
enum Refresh<T> {
    Hit(T),
    Expired(u64),
    Mismatch(&'static str),
}

impl LocalCache {
    // == Constructor ==
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Creates a cache honoring the engine settings of `config`.
    pub fn with_config(config: &Config) -> Self {
        Self::build(config.debug_log)
    }

    fn build(debug_log: bool) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: EntryStore::new(),
                stats: StatsRecorder::new(),
                debug_log,
            }),
        }
    }

    // == Set ==
    /// Stores `value` with no expiration, replacing any existing entry.
    pub fn set<V>(&self, key: impl Into<String>, value: V) -> Result<()>
    where
        V: Any + Send + Sync,
    {
        self.insert(key.into(), CachedValue::new(value), None)
    }

    /// Stores `value` so that it expires `ttl` from now.
    ///
    /// # Errors
    /// `InvalidArgument` if `ttl` is zero or the key is empty.
    pub fn set_with_ttl<V>(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<()>
    where
        V: Any + Send + Sync,
    {
        validate_ttl(ttl)?;
        self.insert(key.into(), CachedValue::new(value), Some(ttl))
    }

    fn insert(&self, key: String, value: CachedValue, ttl: Option<Duration>) -> Result<()> {
        validate_key(&key)?;
        if self.inner.debug_log {
            debug!(key = %key, ttl = ?ttl, type_name = value.type_name(), "cache write");
        }
        let entry = CacheEntry::new(value, ttl, Instant::now());
        self.inner.store.put(key, entry);
        Ok(())
    }

    // == Get ==
    /// Reads the value for `key` as `T`.
    ///
    /// Returns `Ok(None)` when the key is absent or expired. An expired entry
    /// found here is reclaimed on the spot.
    ///
    /// # Errors
    /// `TypeMismatch` if the stored value cannot be read as `T`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        let now = Instant::now();

        let Some(entry) = self.inner.store.get_if_present(key) else {
            return Ok(self.miss(key));
        };

        if !expiry::is_visible(&entry, now) {
            self.reclaim(key, entry.stamp, now);
            return Ok(self.miss(key));
        }

        match entry.value.read::<T>() {
            Some(value) => {
                self.hit(key);
                Ok(Some(value))
            }
            None => Err(self.mismatch::<T>(key, entry.value.type_name())),
        }
    }

    // == Get And Refresh ==
    /// Reads the value for `key` and, on a hit, moves its expiration to `now + ttl`.
    ///
    /// The read and the refresh happen under the same entry lock, so the
    /// returned value always belongs to the entry whose deadline moved. A
    /// miss or a type mismatch refreshes nothing.
    pub fn get_and_refresh<T: Any + Clone>(&self, key: &str, ttl: Duration) -> Result<Option<T>> {
        validate_key(key)?;
        validate_ttl(ttl)?;
        let now = Instant::now();

        let outcome = self.inner.store.update(key, |entry| {
            if !expiry::is_visible(entry, now) {
                return Refresh::Expired(entry.stamp);
            }
            match entry.value.read::<T>() {
                Some(value) => {
                    entry.refresh(ttl, now);
                    Refresh::Hit(value)
                }
                None => Refresh::Mismatch(entry.value.type_name()),
            }
        });

        match outcome {
            Some(Refresh::Hit(value)) => {
                self.hit(key);
                Ok(Some(value))
            }
            Some(Refresh::Expired(stamp)) => {
                self.reclaim(key, stamp, now);
                Ok(self.miss(key))
            }
            Some(Refresh::Mismatch(found)) => Err(self.mismatch::<T>(key, found)),
            None => Ok(self.miss(key)),
        }
    }

    // == Delete ==
    /// Removes the entry for `key`. Deleting an absent key is a no-op.
    ///
    /// Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let removed = self.inner.store.remove(key);
        if self.inner.debug_log {
            debug!(key, removed, "cache delete");
        }
        Ok(removed)
    }

    // == Delete By Pattern ==
    /// Removes every entry whose key matches the glob `pattern`.
    ///
    /// Returns the number of entries removed.
    pub fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::compile(pattern)?;
        let removed = self.inner.store.remove_matching(|key| pattern.matches(key));
        self.inner.stats.record_pattern_deleted(removed);
        if self.inner.debug_log {
            debug!(pattern = ?pattern, removed, "cache pattern delete");
        }
        Ok(removed)
    }

    // == Lookups ==
    /// Returns true if `key` holds a visible entry.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.inner.store.get_if_present(key) {
            Some(entry) if expiry::is_visible(&entry, now) => true,
            Some(entry) => {
                self.reclaim(key, entry.stamp, now);
                false
            }
            None => false,
        }
    }

    /// Remaining lifetime of `key`.
    ///
    /// Outer `None` means the key is not visible; `Some(None)` means the entry
    /// never expires.
    pub fn ttl_remaining(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        self.inner
            .store
            .get_if_present(key)
            .filter(|entry| expiry::is_visible(entry, now))
            .map(|entry| entry.ttl_remaining(now))
    }

    /// Visible keys matching `pattern`. Nothing is removed.
    pub fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = KeyPattern::compile(pattern)?;
        let now = Instant::now();
        Ok(self
            .inner
            .store
            .keys_where(|key, entry| expiry::is_visible(entry, now) && pattern.matches(key)))
    }

    // == Maintenance ==
    /// Runs one active expiration pass.
    ///
    /// With `max_scan`, at most that many scheduled deadlines are consumed,
    /// rotating across the deadline lanes from pass to pass, so a pass costs
    /// the same however large the store is. Returns entries reclaimed.
    pub fn purge_expired(&self, max_scan: Option<usize>) -> usize {
        let removed = expiry::sweep(&self.inner.store, Instant::now(), max_scan);
        self.inner.stats.record_swept(removed);
        removed
    }

    /// Removes every entry. Returns the approximate count removed.
    pub fn clear(&self) -> usize {
        self.inner.store.clear()
    }

    /// Physical entry count, including expired entries not yet reclaimed.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.store.len())
    }

    // == Bookkeeping ==
    fn hit(&self, key: &str) {
        self.inner.stats.record_hit();
        if self.inner.debug_log {
            debug!(key, "cache hit");
        }
    }

    fn miss<T>(&self, key: &str) -> Option<T> {
        self.inner.stats.record_miss();
        if self.inner.debug_log {
            debug!(key, "cache miss");
        }
        None
    }

    fn mismatch<T>(&self, key: &str, found: &'static str) -> CacheError {
        self.inner.stats.record_type_mismatch();
        CacheError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
            found,
        }
    }

    fn reclaim(&self, key: &str, stamp: u64, now: Instant) {
        if expiry::reclaim(&self.inner.store, key, stamp, now) {
            self.inner.stats.record_lazy_reclaim();
        }
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::invalid("key must not be empty"));
    }
    Ok(())
}

fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(CacheError::invalid("ttl must be positive"));
    }
    Ok(())
}
