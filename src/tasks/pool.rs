//! Async Worker Pool
//!
//! Runs fire-and-forget cache writes and deletes off the caller's thread.
//!
//! The pool owns a dedicated multi-thread tokio runtime whose workers pull
//! tasks from one bounded queue. When the queue is full, `submit` rejects the
//! task and reports it (`CacheError::Rejected`); it never blocks and never
//! runs the task on the caller's thread. There is no per-key ordering: a write
//! and a delete for the same key submitted back to back may run in either order.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use crate::cache::LocalCache;
use crate::error::{CacheError, Result};

/// A unit of work accepted by the pool.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

// == Pool Config ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker count, also the runtime's thread count
    pub workers: usize,
    /// Maximum number of queued, not yet running tasks
    pub queue_capacity: usize,
    /// How long `shutdown` waits for running tasks to finish
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 10_000,
            shutdown_grace: Duration::from_millis(500),
        }
    }
}

// == Pool Stats ==
#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of worker pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Tasks accepted into the queue
    pub submitted: u64,
    /// Tasks that ran and returned Ok
    pub completed: u64,
    /// Tasks that returned an error or panicked
    pub failed: u64,
    /// Tasks refused because the queue was full
    pub rejected: u64,
    /// Queued tasks dropped at shutdown
    pub discarded: u64,
}

static GLOBAL_POOL: Mutex<Option<Arc<WorkerPool>>> = Mutex::new(None);

// == Worker Pool ==
pub struct WorkerPool {
    config: PoolConfig,
    sender: RwLock<Option<mpsc::Sender<Task>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Task>>>,
    shutdown_tx: watch::Sender<bool>,
    runtime: Mutex<Option<Runtime>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    // == Constructor ==
    /// Starts a pool with its own runtime and `config.workers` workers.
    ///
    /// Use this for scoped instances (tests, components with their own
    /// lifecycle); [`WorkerPool::acquire`] hands out the process-wide one.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let workers = config.workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("cache-worker")
            .enable_time()
            .build()
            .map_err(|e| CacheError::PoolInit(e.to_string()))?;

        let (sender, receiver) = mpsc::channel::<Task>(config.queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let (shutdown_tx, _) = watch::channel(false);
        let counters = Arc::new(PoolCounters::default());

        for id in 0..workers {
            runtime.spawn(worker_loop(
                id,
                Arc::clone(&receiver),
                shutdown_tx.subscribe(),
                Arc::clone(&counters),
            ));
        }

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "Cache worker pool started"
        );

        Ok(Self {
            config,
            sender: RwLock::new(Some(sender)),
            receiver,
            shutdown_tx,
            runtime: Mutex::new(Some(runtime)),
            counters,
        })
    }

    // == Process-Wide Instance ==
    /// Returns the process-wide pool, starting it on first use.
    ///
    /// `config` only matters when the pool is started; later calls share the
    /// running instance. After [`WorkerPool::shutdown_global`] the next call
    /// starts a fresh pool.
    pub fn acquire(config: &PoolConfig) -> Result<Arc<WorkerPool>> {
        let mut slot = lock(&GLOBAL_POOL);
        if let Some(pool) = slot.as_ref().filter(|pool| !pool.is_shutdown()) {
            return Ok(Arc::clone(pool));
        }

        let pool = Arc::new(WorkerPool::new(config.clone())?);
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Shuts down the process-wide pool, if one was started.
    pub fn shutdown_global() {
        let pool = lock(&GLOBAL_POOL).take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }

    // == Submit ==
    /// Queues `task` for a background worker and returns immediately.
    ///
    /// # Errors
    /// - `Rejected` when the queue is full
    /// - `PoolShutdown` after [`WorkerPool::shutdown`]
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(CacheError::PoolShutdown);
        };

        match sender.try_send(Box::new(task)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    capacity = self.config.queue_capacity,
                    "Cache worker queue full, task rejected"
                );
                Err(CacheError::Rejected(format!(
                    "worker queue full (capacity {})",
                    self.config.queue_capacity
                )))
            }
            Err(TrySendError::Closed(_)) => Err(CacheError::PoolShutdown),
        }
    }

    /// Queues a write of `value` under `key`, with an optional TTL.
    pub fn submit_set<V>(
        &self,
        cache: &LocalCache,
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        V: Any + Send + Sync,
    {
        let cache = cache.clone();
        let key = key.into();
        self.submit(move || match ttl {
            Some(ttl) => cache.set_with_ttl(key, value, ttl),
            None => cache.set(key, value),
        })
    }

    /// Queues a delete of `key`.
    pub fn submit_delete(&self, cache: &LocalCache, key: impl Into<String>) -> Result<()> {
        let cache = cache.clone();
        let key = key.into();
        self.submit(move || cache.delete(&key).map(|_| ()))
    }

    /// Queues a pattern delete.
    pub fn submit_delete_by_pattern(
        &self,
        cache: &LocalCache,
        pattern: impl Into<String>,
    ) -> Result<()> {
        let cache = cache.clone();
        let pattern = pattern.into();
        self.submit(move || cache.delete_by_pattern(&pattern).map(|_| ()))
    }

    // == Shutdown ==
    /// Stops accepting tasks, discards what is still queued and stops the workers.
    ///
    /// A task already running always finishes, but shutdown only waits
    /// `shutdown_grace` for it. Called from inside a tokio runtime, the pool
    /// is released without waiting. Calling this twice is a no-op.
    pub fn shutdown(&self) {
        let Some(runtime) = lock(&self.runtime).take() else {
            return;
        };

        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let _ = self.shutdown_tx.send(true);

        if tokio::runtime::Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(self.config.shutdown_grace);
        }

        let discarded = self.drain_pending();
        self.counters
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);

        if discarded > 0 {
            warn!(discarded, "Cache worker pool shut down, queued tasks discarded");
        } else {
            info!("Cache worker pool shut down");
        }
    }

    fn drain_pending(&self) -> usize {
        match self.receiver.try_lock() {
            Ok(mut receiver) => {
                receiver.close();
                let mut discarded = 0;
                while receiver.try_recv().is_ok() {
                    discarded += 1;
                }
                discarded
            }
            // A worker abandoned by shutdown_background may still hold it
            Err(_) => {
                debug!("Cache worker queue still locked at shutdown, pending tasks not counted");
                0
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.runtime).is_none()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

// == Worker ==
async fn worker_loop(
    id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Task>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    counters: Arc<PoolCounters>,
) {
    debug!(worker = id, "Cache worker started");

    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                task = receiver.recv() => task,
            }
        };

        let Some(task) = next else {
            break;
        };
        run_task(id, task, &counters);
    }

    debug!(worker = id, "Cache worker stopped");
}

/// Runs one task; errors and panics are logged and never escape the worker.
fn run_task(worker: usize, task: Task, counters: &PoolCounters) {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(err)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let err = CacheError::TaskFailed(err.to_string());
            warn!(worker, error = %err, "Async cache task failed");
        }
        Err(payload) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(worker, panic = panic_message(&*payload), "Async cache task panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
