//! Background Tasks Module
//!
//! Work that runs off the caller's thread.
//!
//! # Tasks
//! - Expiration sweep: reclaims expired cache entries at a configured interval
//! - Worker pool: runs fire-and-forget cache writes and deletes

mod pool;
mod sweep;

pub use pool::{PoolConfig, PoolStats, Task, WorkerPool};
pub use sweep::spawn_sweep_task;
