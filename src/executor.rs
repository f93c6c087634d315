//! # Executors
//!
//! The minimal "accept a unit of work, run it later" contract and its
//! implementations: a fixed-size pool draining one shared FIFO channel, a
//! dedicated single worker for strictly ordered execution, and an inline
//! fallback. Two process-wide pools back the agent's `send`/`send_off`
//! split: a CPU-sized pool for lightweight jobs and a wider one for
//! I/O-oriented jobs.
//!
//! Executors make no ordering promise across items posted from different
//! sources; serialization is built on top by the agent and delegator.

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of deferred work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Minimal scheduling contract: accept a unit of work and run it,
/// asynchronously where possible. An executor that can no longer accept
/// work runs the item immediately on the calling thread instead of
/// dropping it.
pub trait Executor: Send + Sync {
    fn post(&self, work: Work);
}

/// Counters tracking an executor's activity.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Work items accepted by `post`
    pub posted: AtomicUsize,
    /// Work items that finished running
    pub executed: AtomicUsize,
    /// Work items that panicked while running
    pub panicked: AtomicUsize,
    /// Items run inline on the calling thread after shutdown
    pub inline_fallbacks: AtomicUsize,
}

impl ExecutorStats {
    /// Number of accepted items that have not finished running yet.
    pub fn pending(&self) -> usize {
        let posted = self.posted.load(Ordering::Relaxed);
        let executed = self.executed.load(Ordering::Relaxed);
        posted.saturating_sub(executed)
    }
}

/// Fixed-size worker pool draining one shared FIFO channel.
pub struct ThreadPoolExecutor {
    tx: Mutex<Option<Sender<Work>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<ExecutorStats>,
}

impl ThreadPoolExecutor {
    /// Spawn `threads` named workers draining a shared queue. At least one
    /// worker is always created.
    pub fn new(name: &str, threads: usize) -> Self {
        let (tx, rx) = unbounded::<Work>();
        let stats = Arc::new(ExecutorStats::default());
        let mut workers = Vec::with_capacity(threads.max(1));
        for id in 0..threads.max(1) {
            let rx = rx.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker_loop(rx, stats))
                .expect("Failed to spawn worker thread");
            workers.push(handle);
        }
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            stats,
        }
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    /// Stop accepting work and join the workers. Already-queued items
    /// drain first.
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        let me = thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            // A worker tearing down the pool must not join itself.
            if handle.thread().id() == me {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn post(&self, work: Work) {
        self.stats.posted.fetch_add(1, Ordering::Relaxed);
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => {
                if let Err(rejected) = tx.send(work) {
                    // Workers are gone; run on the calling thread.
                    self.stats.inline_fallbacks.fetch_add(1, Ordering::Relaxed);
                    run_work(rejected.into_inner(), &self.stats);
                }
            }
            None => {
                self.stats.inline_fallbacks.fetch_add(1, Ordering::Relaxed);
                run_work(work, &self.stats);
            }
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Work>, stats: Arc<ExecutorStats>) {
    // Drains until every sender is gone, then exits.
    for work in rx.iter() {
        run_work(work, &stats);
    }
}

fn run_work(work: Work, stats: &ExecutorStats) {
    // A panicking item must not take the worker down with it.
    if catch_unwind(AssertUnwindSafe(work)).is_err() {
        stats.panicked.fetch_add(1, Ordering::Relaxed);
    }
    stats.executed.fetch_add(1, Ordering::Relaxed);
}

/// One dedicated worker thread; items run strictly in post order.
pub struct SingleWorker {
    pool: ThreadPoolExecutor,
}

impl SingleWorker {
    pub fn new(name: &str) -> Self {
        Self { pool: ThreadPoolExecutor::new(name, 1) }
    }

    pub fn stats(&self) -> &ExecutorStats {
        self.pool.stats()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown()
    }
}

impl Executor for SingleWorker {
    fn post(&self, work: Work) {
        self.pool.post(work)
    }
}

/// Runs each item inline on the posting thread.
pub struct Immediate;

impl Executor for Immediate {
    fn post(&self, work: Work) {
        work()
    }
}

/// Sizing for the process-wide pools.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers in the CPU-bound pool
    pub cpu_threads: usize,
    /// Workers in the I/O-oriented pool
    pub io_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            cpu_threads: cores,
            io_threads: (cores * 2).max(4),
        }
    }
}

static POOL_CONFIG: OnceCell<PoolConfig> = OnceCell::new();

static CPU_POOL: Lazy<Arc<ThreadPoolExecutor>> =
    Lazy::new(|| Arc::new(ThreadPoolExecutor::new("sequin-cpu", pool_config().cpu_threads)));

static IO_POOL: Lazy<Arc<ThreadPoolExecutor>> =
    Lazy::new(|| Arc::new(ThreadPoolExecutor::new("sequin-io", pool_config().io_threads)));

/// Install pool sizing before either shared pool is first used. Returns
/// false if the configuration was already fixed.
pub fn configure_pools(config: PoolConfig) -> bool {
    POOL_CONFIG.set(config).is_ok()
}

fn pool_config() -> PoolConfig {
    POOL_CONFIG.get_or_init(PoolConfig::default).clone()
}

/// Shared pool for lightweight, CPU-bound jobs.
pub fn cpu_pool() -> Arc<ThreadPoolExecutor> {
    Arc::clone(&CPU_POOL)
}

/// Shared pool for blocking, I/O-oriented jobs.
pub fn io_pool() -> Arc<ThreadPoolExecutor> {
    Arc::clone(&IO_POOL)
}
