//! Slidecache benchmark driver
//!
//! Fills the cache with TTL'd entries, checks that all of them are served
//! before expiry and none after, then drives concurrent async writes and
//! deletes through the worker pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidecache::{spawn_sweep_task, CacheError, Config, LocalCache, WorkerPool};

const DEFAULT_BENCH_KEYS: usize = 500_000;
const BENCH_TTL: Duration = Duration::from_secs(7);
const CONCURRENT_WRITERS: usize = 4;
const CONCURRENT_KEYS_PER_WRITER: usize = 5_000;

/// Entry point for the benchmark.
///
/// # Run Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start the expiration sweep
/// 4. Run the expiry scenario
/// 5. Run the concurrent worker pool scenario
/// 6. Print final statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidecache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let keys = std::env::var("BENCH_KEYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BENCH_KEYS);
    info!(
        keys,
        sweep_interval_ms = config.sweep_interval_ms,
        pool_workers = config.pool_workers,
        "Starting cache benchmark"
    );

    let cache = LocalCache::with_config(&config);
    let sweeper = spawn_sweep_task(cache.clone(), config.sweep_interval(), config.sweep_batch());

    run_expiry_scenario(&cache, keys).await?;
    run_concurrent_scenario(&cache, &config).await?;

    sweeper.abort();

    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(hit_rate = stats.hit_rate(), "Benchmark complete");
    Ok(())
}

async fn run_expiry_scenario(cache: &LocalCache, keys: usize) -> anyhow::Result<()> {
    let started = Instant::now();
    for i in 0..keys {
        cache.set_with_ttl(bench_key(i), i, BENCH_TTL)?;
    }
    info!(keys, elapsed_ms = started.elapsed().as_millis() as u64, "Populated cache");

    let started = Instant::now();
    let hits = count_hits(cache, keys)?;
    info!(hits, elapsed_ms = started.elapsed().as_millis() as u64, "Read pass before expiry");
    ensure!(hits == keys, "expected {} hits before expiry, got {}", keys, hits);

    tokio::time::sleep(BENCH_TTL + Duration::from_millis(500)).await;

    let hits = count_hits(cache, keys)?;
    info!(misses = keys - hits, "Read pass after expiry");
    ensure!(hits == 0, "expected no hits after expiry, got {}", hits);

    for i in 0..keys {
        cache.delete(&bench_key(i))?;
    }
    ensure!(cache.is_empty(), "store not empty after deleting every key");
    Ok(())
}

async fn run_concurrent_scenario(cache: &LocalCache, config: &Config) -> anyhow::Result<()> {
    let pool = WorkerPool::acquire(&config.pool_config()).context("starting worker pool")?;
    let rejected = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let started = Instant::now();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let done = Arc::clone(&done);
            tokio::task::spawn_blocking(move || {
                let (mut reads, mut errors) = (0u64, 0u64);
                while !done.load(Ordering::Relaxed) {
                    for i in (0..CONCURRENT_KEYS_PER_WRITER).step_by(97) {
                        if cache.get::<usize>(&format!("w0:{}", i)).is_err() {
                            errors += 1;
                        }
                        reads += 1;
                    }
                }
                (reads, errors)
            })
        })
        .collect();

    let mut writers = Vec::with_capacity(CONCURRENT_WRITERS);
    let mut deleters = Vec::with_capacity(CONCURRENT_WRITERS);
    for w in 0..CONCURRENT_WRITERS {
        // Every tenth accepted write is handed to this writer's deleter
        let (written_tx, written_rx) = std_mpsc::channel::<String>();

        let cache_w = cache.clone();
        let pool_w = Arc::clone(&pool);
        let rejected_w = Arc::clone(&rejected);
        writers.push(tokio::task::spawn_blocking(move || -> slidecache::Result<u64> {
            let mut accepted = 0;
            for i in 0..CONCURRENT_KEYS_PER_WRITER {
                let key = format!("w{}:{}", w, i);
                let submitted =
                    pool_w.submit_set(&cache_w, key.clone(), i, Some(Duration::from_secs(60)));
                match submitted {
                    Ok(()) => {
                        accepted += 1;
                        if i % 10 == 9 {
                            let _ = written_tx.send(key);
                        }
                    }
                    Err(CacheError::Rejected(_)) => {
                        rejected_w.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(accepted)
        }));

        let cache_d = cache.clone();
        let pool_d = Arc::clone(&pool);
        let rejected_d = Arc::clone(&rejected);
        deleters.push(tokio::task::spawn_blocking(move || -> slidecache::Result<u64> {
            let mut accepted = 0;
            for key in written_rx {
                // The write was only queued; delete once it has landed
                let give_up = Instant::now() + Duration::from_secs(1);
                while !cache_d.contains_key(&key) && Instant::now() < give_up {
                    std::thread::sleep(Duration::from_millis(1));
                }
                if !cache_d.contains_key(&key) {
                    continue;
                }
                match pool_d.submit_delete(&cache_d, key) {
                    Ok(()) => accepted += 1,
                    Err(CacheError::Rejected(_)) => {
                        rejected_d.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(accepted)
        }));
    }

    let mut written = 0;
    for writer in writers {
        written += writer.await??;
    }
    let mut deleted = 0;
    for deleter in deleters {
        deleted += deleter.await??;
    }

    // Let the queue drain before reading the pool's final numbers
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let stats = pool.stats();
        if stats.completed + stats.failed >= stats.submitted || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    done.store(true, Ordering::Relaxed);
    let (mut reads, mut read_errors) = (0, 0);
    for reader in readers {
        let (r, e) = reader.await?;
        reads += r;
        read_errors += e;
    }

    let pool_stats = pool.stats();
    let remaining = cache.keys_matching("w*")?.len() as u64;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        written,
        deleted,
        remaining,
        reads,
        "Concurrent scenario finished"
    );
    if rejected.load(Ordering::Relaxed) > 0 {
        warn!(rejected = rejected.load(Ordering::Relaxed), "Some async tasks were rejected");
    }
    println!("{}", serde_json::to_string_pretty(&pool_stats)?);

    WorkerPool::shutdown_global();
    ensure!(pool_stats.failed == 0, "{} async tasks failed", pool_stats.failed);
    ensure!(read_errors == 0, "{} concurrent reads failed", read_errors);
    ensure!(
        remaining == written - deleted,
        "expected {} keys after async writes and deletes, found {}",
        written - deleted,
        remaining
    );
    Ok(())
}

fn count_hits(cache: &LocalCache, keys: usize) -> slidecache::Result<usize> {
    let mut hits = 0;
    for i in 0..keys {
        if cache.get::<usize>(&bench_key(i))?.is_some() {
            hits += 1;
        }
    }
    Ok(hits)
}

fn bench_key(i: usize) -> String {
    format!("bench:{}", i)
}
