//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and reclamation.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Recorder ==
/// Lock-free counters updated by the engine on every operation.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    type_mismatches: AtomicU64,
    lazy_reclaimed: AtomicU64,
    swept: AtomicU64,
    pattern_deleted: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_type_mismatch(&self) {
        self.type_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lazy_reclaim(&self) {
        self.lazy_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, count: usize) {
        self.swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_pattern_deleted(&self, count: usize) {
        self.pattern_deleted.fetch_add(count as u64, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Point-in-time copy of the counters. Counters are read independently,
    /// so a snapshot taken under load is approximate.
    pub fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            type_mismatches: self.type_mismatches.load(Ordering::Relaxed),
            lazy_reclaimed: self.lazy_reclaimed.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            pattern_deleted: self.pattern_deleted.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that found nothing visible (absent or expired)
    pub misses: u64,
    /// Reads rejected because the stored type did not fit
    pub type_mismatches: u64,
    /// Expired entries removed by readers
    pub lazy_reclaimed: u64,
    /// Expired entries removed by the active sweep
    pub swept: u64,
    /// Entries removed by pattern deletion
    pub pattern_deleted: u64,
    /// Physical entry count at snapshot time
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsRecorder::new().snapshot(0);
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        assert_eq!(recorder.snapshot(3).hit_rate(), 0.75);
    }

    #[test]
    fn test_reclaim_counters() {
        let recorder = StatsRecorder::new();
        recorder.record_lazy_reclaim();
        recorder.record_swept(4);
        recorder.record_pattern_deleted(2);
        recorder.record_type_mismatch();

        let stats = recorder.snapshot(10);
        assert_eq!(stats.lazy_reclaimed, 1);
        assert_eq!(stats.swept, 4);
        assert_eq!(stats.pattern_deleted, 2);
        assert_eq!(stats.type_mismatches, 1);
        assert_eq!(stats.total_entries, 10);
    }

    #[test]
    fn test_stats_serialize() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        let json = serde_json::to_value(recorder.snapshot(1)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["total_entries"], 1);
    }
}
