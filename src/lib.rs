//! Slidecache - an embeddable in-process cache
//!
//! Provides a thread-safe key/value cache with per-entry TTL, sliding
//! expiration, pattern-based invalidation and a background worker pool for
//! fire-and-forget writes.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, LocalCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_sweep_task, PoolConfig, WorkerPool};
