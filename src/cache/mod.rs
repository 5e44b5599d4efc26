//! Cache Module
//!
//! Provides in-process caching with per-entry TTL, sliding expiration and
//! pattern-based invalidation.

mod deadlines;
mod engine;
mod entry;
pub mod expiry;
mod pattern;
mod stats;
mod store;
mod value;


// Re-export public types
pub use deadlines::{Deadline, DeadlineIndex};
pub use engine::LocalCache;
pub use entry::CacheEntry;
pub use pattern::KeyPattern;
pub use stats::{CacheStats, StatsRecorder};
pub use store::EntryStore;
pub use value::{coerce, CachedValue};
