//! Active Expiration Task
//!
//! Background task that periodically reclaims expired cache entries that
//! nobody reads anymore.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::LocalCache;

/// Spawns a background task that periodically sweeps expired entries.
///
/// Each tick runs [`LocalCache::purge_expired`], which pops due deadlines
/// and removes their entries one key at a time, so `get`/`set`/`delete`
/// callers are never blocked for the length of a pass.
///
/// # Arguments
/// * `cache` - Handle to the cache to sweep
/// * `interval` - Time between sweep passes
/// * `batch` - Maximum deadlines consumed per pass, `None` for every due deadline
///
/// # Returns
/// A JoinHandle for the spawned task; abort it to stop sweeping.
///
/// # Example
/// ```ignore
/// let cache = LocalCache::new();
/// let sweeper = spawn_sweep_task(cache.clone(), Duration::from_secs(1), None);
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweep_task(
    cache: LocalCache,
    interval: Duration,
    batch: Option<usize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, ?batch, "Starting expiration sweep task");

        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = cache.purge_expired(batch);

            if removed > 0 {
                debug!(removed, remaining = cache.len(), "Sweep reclaimed expired entries");
            } else {
                debug!("Sweep found no expired entries");
            }
        }
    })
}
