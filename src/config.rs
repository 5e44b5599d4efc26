//! Configuration Module
//!
//! Handles loading and managing engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::tasks::PoolConfig;

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Active expiration sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// Maximum entries inspected per sweep pass, 0 = whole store
    pub sweep_batch: usize,
    /// Number of async worker tasks
    pub pool_workers: usize,
    /// Bounded queue size of the worker pool
    pub pool_queue_capacity: usize,
    /// How long shutdown waits for in-flight tasks, in milliseconds
    pub pool_shutdown_grace_ms: u64,
    /// Emit per-operation debug traces from the engine
    pub debug_log: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL_MS` - Sweep period (default: 1000)
    /// - `SWEEP_BATCH` - Deadlines consumed per sweep (default: 0, all due)
    /// - `POOL_WORKERS` - Async worker count (default: 4)
    /// - `POOL_QUEUE_CAPACITY` - Pending task limit (default: 10000)
    /// - `POOL_SHUTDOWN_GRACE_MS` - Shutdown grace period (default: 500)
    /// - `CACHE_DEBUG_LOG` - Per-operation debug traces, `true`/`1`/`yes`/`on` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            sweep_batch: env_or("SWEEP_BATCH", defaults.sweep_batch),
            pool_workers: env_or("POOL_WORKERS", defaults.pool_workers),
            pool_queue_capacity: env_or("POOL_QUEUE_CAPACITY", defaults.pool_queue_capacity),
            pool_shutdown_grace_ms: env_or(
                "POOL_SHUTDOWN_GRACE_MS",
                defaults.pool_shutdown_grace_ms,
            ),
            debug_log: env_flag("CACHE_DEBUG_LOG", defaults.debug_log),
        }
    }

    /// Sweep period as a Duration. Never zero.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Sweep batch bound, `None` when the whole store is walked.
    pub fn sweep_batch(&self) -> Option<usize> {
        (self.sweep_batch > 0).then_some(self.sweep_batch)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.pool_shutdown_grace_ms)
    }

    /// Worker pool settings derived from this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.pool_workers.max(1),
            queue_capacity: self.pool_queue_capacity.max(1),
            shutdown_grace: self.shutdown_grace(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            sweep_batch: 0,
            pool_workers: 4,
            pool_queue_capacity: 10_000,
            pool_shutdown_grace_ms: 500,
            debug_log: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
