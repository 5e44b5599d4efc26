//! Expiration Policy Module
//!
//! Visibility rules plus lazy and active reclamation of expired entries.

use std::time::Instant;

use crate::cache::{CacheEntry, EntryStore};

// == Visibility ==
/// True iff the entry has no expiration or expires strictly after `now`.
#[inline]
pub fn is_visible(entry: &CacheEntry, now: Instant) -> bool {
    !entry.is_expired_at(now)
}

// == Lazy Reclamation ==
/// Removes an entry a reader found expired.
///
/// The removal only happens if `key` still holds the same physical entry and
/// that entry is still expired, so a concurrent overwrite or refresh survives.
pub fn reclaim(store: &EntryStore, key: &str, observed_stamp: u64, now: Instant) -> bool {
    store.remove_if_stamp(key, observed_stamp, |current| !is_visible(current, now))
}

// == Active Reclamation ==
/// One sweep pass: pop due deadlines, then conditionally remove their entries.
///
/// With `max_deadlines`, at most that many scheduled deadlines are consumed,
/// so the work per pass does not grow with the store. Stale deadlines count
/// toward the bound but remove nothing. Returns the number of entries
/// reclaimed.
pub fn sweep(store: &EntryStore, now: Instant, max_deadlines: Option<usize>) -> usize {
    store
        .pop_due(now, max_deadlines)
        .into_iter()
        .filter(|(key, stamp)| {
            store.remove_if_stamp(key, *stamp, |current| !is_visible(current, now))
        })
        .count()
}
