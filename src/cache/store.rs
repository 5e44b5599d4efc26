//! Entry Store Module
//!
//! Concurrent key -> entry mapping backed by a sharded `DashMap`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use crate::cache::deadlines::{Deadline, DeadlineIndex};
use crate::cache::CacheEntry;

// == Entry Store ==
/// Thread-safe storage for cache entries.
///
/// Writes lock only the shard holding the key, so traffic on unrelated keys
/// never serializes behind a single lock. Every inserted entry receives a
/// fresh stamp, which conditional removals use to make sure they only ever
/// reclaim the instance they observed. Entries with a TTL are also
/// scheduled in a [`DeadlineIndex`] so sweeps can find them without a scan.
#[derive(Debug)]
pub struct EntryStore {
    entries: DashMap<String, CacheEntry>,
    deadlines: DeadlineIndex,
    next_stamp: AtomicU64,
}

impl EntryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            deadlines: DeadlineIndex::new(),
            next_stamp: AtomicU64::new(1),
        }
    }

    // == Put ==
    /// Inserts or atomically replaces the entry for `key`.
    ///
    /// Returns the stamp assigned to the new entry.
    pub fn put(&self, key: String, mut entry: CacheEntry) -> u64 {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        entry.stamp = stamp;
        let expire_at = entry.expire_at;
        match expire_at {
            Some(at) => {
                self.entries.insert(key.clone(), entry);
                self.schedule(key, stamp, at);
            }
            None => {
                self.entries.insert(key, entry);
            }
        }
        stamp
    }

    // == Get If Present ==
    /// Returns a copy of the entry, expired or not.
    ///
    /// Values are shared behind an `Arc`, so the copy is cheap.
    pub fn get_if_present(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    // == Update ==
    /// Runs `f` against the entry while holding its shard write lock.
    ///
    /// Returns None if the key is absent. A changed deadline is rescheduled
    /// once the lock is released.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut CacheEntry) -> R) -> Option<R> {
        let mut entry = self.entries.get_mut(key)?;
        let before = entry.expire_at;
        let result = f(entry.value_mut());
        let moved = match entry.expire_at {
            Some(at) if entry.expire_at != before => Some((at, entry.stamp)),
            _ => None,
        };
        drop(entry);

        if let Some((at, stamp)) = moved {
            self.schedule(key.to_string(), stamp, at);
        }
        Some(result)
    }

    // == Remove ==
    /// Removes the entry for `key`. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes `key` only if it still holds the entry with `stamp` and `still` holds for it.
    pub fn remove_if_stamp(
        &self,
        key: &str,
        stamp: u64,
        still: impl FnOnce(&CacheEntry) -> bool,
    ) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.stamp == stamp && still(entry))
            .is_some()
    }

    // == Remove Matching ==
    /// Removes every entry whose key satisfies `predicate`.
    ///
    /// Keys are snapshotted first and removed one by one, so no shard stays
    /// write-locked for the whole scan. Returns the number removed.
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let matched: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|entry| predicate(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().stamp))
            .collect();

        matched
            .into_iter()
            .filter(|(key, stamp)| self.remove_if_stamp(key, *stamp, |_| true))
            .count()
    }

    // == Due Entries ==
    /// Pops scheduled deadlines that are due at `now`, at most `limit` of them.
    ///
    /// Returns `(key, stamp)` pairs. A pair may be stale (the entry was since
    /// overwritten, refreshed or deleted), so removal must re-check it.
    pub fn pop_due(&self, now: Instant, limit: Option<usize>) -> Vec<(String, u64)> {
        self.deadlines
            .pop_due(now, limit)
            .into_iter()
            .map(|deadline| (deadline.key, deadline.stamp))
            .collect()
    }

    /// Deadlines still scheduled, stale ones included.
    pub fn pending_deadlines(&self) -> usize {
        self.deadlines.pending()
    }

    fn schedule(&self, key: String, stamp: u64, at: Instant) {
        self.deadlines.schedule(Deadline { at, stamp, key }, |d| {
            self.entries
                .get(&d.key)
                .is_some_and(|entry| entry.stamp == d.stamp && entry.expire_at == Some(d.at))
        });
    }

    /// Keys satisfying `predicate` over key and entry.
    pub fn keys_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    // == Clear ==
    /// Removes every entry, returning the approximate count removed.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.deadlines.clear();
        count
    }

    // == Length ==
    /// Physical entry count, including expired entries not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedValue;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn entry(value: &str) -> CacheEntry {
        CacheEntry::new(CachedValue::new(value.to_string()), None, Instant::now())
    }

    fn read(store: &EntryStore, key: &str) -> Option<String> {
        store
            .get_if_present(key)
            .and_then(|e| e.value.read::<String>())
    }

    #[test]
    fn test_store_new() {
        let store = EntryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_and_get() {
        let store = EntryStore::new();
        store.put("key1".to_string(), entry("value1"));

        assert_eq!(read(&store, "key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_replaces_and_restamps() {
        let store = EntryStore::new();
        let first = store.put("key1".to_string(), entry("value1"));
        let second = store.put("key1".to_string(), entry("value2"));

        assert_ne!(first, second);
        assert_eq!(read(&store, "key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_does_not_filter_expired() {
        let store = EntryStore::new();
        let mut stale = entry("old");
        stale.expire_at = Some(Instant::now() - Duration::from_secs(1));
        store.put("k".to_string(), stale);

        assert!(store.get_if_present("k").is_some());
    }

    #[test]
    fn test_remove_idempotent() {
        let store = EntryStore::new();
        store.put("key1".to_string(), entry("value1"));

        assert!(store.remove("key1"));
        assert!(!store.remove("key1"));
        assert!(!store.remove("never"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_if_stamp_skips_newer_entry() {
        let store = EntryStore::new();
        let old = store.put("k".to_string(), entry("old"));
        store.put("k".to_string(), entry("new"));

        assert!(!store.remove_if_stamp("k", old, |_| true));
        assert_eq!(read(&store, "k").as_deref(), Some("new"));
    }

    #[test]
    fn test_remove_if_stamp_checks_condition() {
        let store = EntryStore::new();
        let stamp = store.put("k".to_string(), entry("v"));

        assert!(!store.remove_if_stamp("k", stamp, |_| false));
        assert!(store.remove_if_stamp("k", stamp, |_| true));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_in_place() {
        let store = EntryStore::new();
        store.put("k".to_string(), entry("v"));

        let deadline = Instant::now() + Duration::from_secs(5);
        let updated = store.update("k", |e| {
            e.expire_at = Some(deadline);
            e.stamp
        });

        assert!(updated.is_some());
        assert_eq!(store.get_if_present("k").unwrap().expire_at, Some(deadline));
        assert!(store.update("missing", |_| ()).is_none());
    }

    #[test]
    fn test_remove_matching() {
        let store = EntryStore::new();
        store.put("user:1".to_string(), entry("a"));
        store.put("user:2".to_string(), entry("b"));
        store.put("order:1".to_string(), entry("c"));

        let removed = store.remove_matching(|key| key.starts_with("user:"));

        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get_if_present("order:1").is_some());
    }

    #[test]
    fn test_pop_due_returns_only_expired_ttl_entries() {
        let store = EntryStore::new();
        let now = Instant::now();
        store.put("forever".to_string(), entry("v"));
        store.put(
            "later".to_string(),
            CacheEntry::new(CachedValue::new(1u8), Some(Duration::from_secs(60)), now),
        );
        let mut stale = entry("old");
        stale.expire_at = Some(now - Duration::from_secs(1));
        let stamp = store.put("stale".to_string(), stale);

        assert_eq!(store.pending_deadlines(), 2);
        assert_eq!(store.pop_due(now, None), vec![("stale".to_string(), stamp)]);
        assert_eq!(store.pending_deadlines(), 1);
    }

    #[test]
    fn test_update_reschedules_moved_deadline() {
        let store = EntryStore::new();
        let now = Instant::now();
        let mut e = entry("v");
        e.expire_at = Some(now - Duration::from_secs(1));
        store.put("k".to_string(), e);

        let later = now + Duration::from_secs(60);
        store.update("k", |e| e.expire_at = Some(later));
        assert_eq!(store.pending_deadlines(), 2);

        // Only the old deadline is due; the new one waits
        assert_eq!(store.pop_due(now, None).len(), 1);
        assert_eq!(store.pop_due(later, None).len(), 1);
        assert_eq!(store.pending_deadlines(), 0);
    }

    #[test]
    fn test_clear() {
        let store = EntryStore::new();
        store.put("a".to_string(), entry("1"));
        store.put("b".to_string(), entry("2"));

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(store.pending_deadlines(), 0);
    }

    #[test]
    fn test_concurrent_puts_distinct_keys() {
        let store = Arc::new(EntryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..500 {
                        store.put(format!("t{}:{}", t, i), entry("v"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8 * 500);
    }
}
