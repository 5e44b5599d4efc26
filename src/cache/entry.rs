//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use crate::cache::CachedValue;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: CachedValue,
    /// Absolute expiration instant, None = no expiration
    pub expire_at: Option<Instant>,
    /// Identity of the physical entry, assigned by the store on insert
    pub stamp: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry with an optional TTL measured from `now`.
    ///
    /// The stamp is left at zero; [`EntryStore::put`](crate::cache::EntryStore::put)
    /// assigns the real one.
    pub fn new(value: CachedValue, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expire_at: ttl.map(|ttl| deadline(now, ttl)),
            stamp: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches the expiration instant; it is
    /// visible only while `expire_at` is strictly after `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expire_at {
            Some(expire_at) => now >= expire_at,
            None => false,
        }
    }

    /// Checks expiration against the current clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Refresh ==
    /// Moves the expiration to `now + ttl`.
    pub fn refresh(&mut self, ttl: Duration, now: Instant) {
        self.expire_at = Some(deadline(now, ttl));
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expire_at
            .map(|expire_at| expire_at.saturating_duration_since(now))
    }
}

/// `now + ttl`, saturating far in the future instead of overflowing.
fn deadline(now: Instant, ttl: Duration) -> Instant {
    const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(ttl)
        .unwrap_or_else(|| now + MAX_TTL)
}
