//! Deadline Index Module
//!
//! Lanes of min-heaps ordered by expiration time, so an active sweep pass
//! only touches entries that are actually due instead of walking the store.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Number of independently locked lanes.
pub const LANES: usize = 32;

/// Lane size below which stale deadlines are never compacted.
const COMPACT_MIN: usize = 1024;

/// A scheduled expiration: the entry stored under `key` with `stamp` is due at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub stamp: u64,
    pub key: String,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.at
            .cmp(&other.at)
            .then(self.stamp.cmp(&other.stamp))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Lane {
    heap: BinaryHeap<Reverse<Deadline>>,
    /// Heap size at which the next compaction runs
    compact_at: usize,
}

impl Lane {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            compact_at: COMPACT_MIN,
        }
    }
}

// == Deadline Index ==
/// Expiration schedule for every entry that carries a TTL.
///
/// Deadlines are never cancelled. An overwrite, refresh or delete leaves the
/// old deadline behind; whoever pops it must re-check the entry (same stamp,
/// still expired) before removing anything. Stale deadlines are dropped when
/// popped or when their lane is compacted.
#[derive(Debug)]
pub struct DeadlineIndex {
    lanes: Box<[Mutex<Lane>]>,
    /// Lane where the next bounded pass starts
    cursor: AtomicUsize,
}

impl DeadlineIndex {
    pub fn new() -> Self {
        Self {
            lanes: (0..LANES).map(|_| Mutex::new(Lane::new())).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    // == Schedule ==
    /// Records that entry `stamp` under `key` expires at `at`.
    ///
    /// When the lane has grown past its compaction threshold, deadlines for
    /// which `is_live` returns false are discarded first.
    pub fn schedule(&self, deadline: Deadline, is_live: impl Fn(&Deadline) -> bool) {
        let mut lane = self.lane(deadline.stamp);
        if lane.heap.len() >= lane.compact_at {
            lane.heap.retain(|Reverse(d)| is_live(d));
            lane.compact_at = (lane.heap.len() * 2).max(COMPACT_MIN);
        }
        lane.heap.push(Reverse(deadline));
    }

    // == Pop Due ==
    /// Pops deadlines that are due at `now`.
    ///
    /// With `limit`, at most that many deadlines are popped in total, starting
    /// from the lane after the one the previous bounded pass started at. Lanes
    /// with nothing due cost one peek each.
    pub fn pop_due(&self, now: Instant, limit: Option<usize>) -> Vec<Deadline> {
        let mut budget = limit.unwrap_or(usize::MAX);
        let start = match limit {
            Some(_) => self.cursor.fetch_add(1, Ordering::Relaxed),
            None => 0,
        };

        let mut due = Vec::new();
        for offset in 0..LANES {
            if budget == 0 {
                break;
            }
            let mut lane = lock(&self.lanes[(start + offset) % LANES]);
            while budget > 0 && lane.heap.peek().is_some_and(|Reverse(d)| d.at <= now) {
                if let Some(Reverse(deadline)) = lane.heap.pop() {
                    due.push(deadline);
                    budget -= 1;
                }
            }
        }
        due
    }

    /// Total scheduled deadlines, stale ones included.
    pub fn pending(&self) -> usize {
        self.lanes.iter().map(|lane| lock(lane).heap.len()).sum()
    }

    pub fn clear(&self) {
        for lane in self.lanes.iter() {
            *lock(lane) = Lane::new();
        }
    }

    fn lane(&self, stamp: u64) -> MutexGuard<'_, Lane> {
        lock(&self.lanes[(stamp % LANES as u64) as usize])
    }
}

impl Default for DeadlineIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline(at: Instant, stamp: u64) -> Deadline {
        Deadline {
            at,
            stamp,
            key: format!("k{}", stamp),
        }
    }

    #[test]
    fn test_pop_due_only_returns_due_deadlines() {
        let index = DeadlineIndex::new();
        let now = Instant::now();
        index.schedule(deadline(now - Duration::from_secs(1), 1), |_| true);
        index.schedule(deadline(now, 2), |_| true);
        index.schedule(deadline(now + Duration::from_secs(60), 3), |_| true);

        let mut due: Vec<u64> = index.pop_due(now, None).iter().map(|d| d.stamp).collect();
        due.sort_unstable();

        assert_eq!(due, vec![1, 2]);
        assert_eq!(index.pending(), 1);
    }

    #[test]
    fn test_pop_due_pops_in_deadline_order_within_lane() {
        let index = DeadlineIndex::new();
        let now = Instant::now();
        // Same lane: stamps congruent modulo LANES
        let late = LANES as u64;
        index.schedule(deadline(now - Duration::from_millis(1), late), |_| true);
        index.schedule(deadline(now - Duration::from_millis(5), 2 * late), |_| true);

        let due = index.pop_due(now, None);
        assert_eq!(due[0].stamp, 2 * late);
        assert_eq!(due[1].stamp, late);
    }

    #[test]
    fn test_bounded_pop_respects_limit() {
        let index = DeadlineIndex::new();
        let now = Instant::now();
        for stamp in 0..100 {
            index.schedule(deadline(now - Duration::from_secs(1), stamp), |_| true);
        }

        assert_eq!(index.pop_due(now, Some(7)).len(), 7);
        assert_eq!(index.pending(), 93);
        assert_eq!(index.pop_due(now, Some(0)).len(), 0);
        assert_eq!(index.pop_due(now, None).len(), 93);
    }

    #[test]
    fn test_bounded_pop_ignores_future_deadlines() {
        let index = DeadlineIndex::new();
        let now = Instant::now();
        for stamp in 0..50_000 {
            index.schedule(deadline(now + Duration::from_secs(3600), stamp), |_| true);
        }

        // Nothing is due, so nothing is consumed however large the index is
        assert!(index.pop_due(now, Some(10)).is_empty());
        assert_eq!(index.pending(), 50_000);
    }

    #[test]
    fn test_compaction_drops_stale_deadlines() {
        let index = DeadlineIndex::new();
        let now = Instant::now() + Duration::from_secs(60);
        // Everything lands in lane 0; only the newest stamp is live
        let total = COMPACT_MIN as u64 + 1;
        for i in 0..total {
            let newest = (total - 1) * LANES as u64;
            index.schedule(deadline(now, i * LANES as u64), |d| d.stamp == newest);
        }

        assert!(index.pending() < COMPACT_MIN);
    }

    #[test]
    fn test_clear() {
        let index = DeadlineIndex::new();
        index.schedule(deadline(Instant::now(), 1), |_| true);
        index.clear();
        assert_eq!(index.pending(), 0);
    }
}
