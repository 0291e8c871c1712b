//! Fixed-size thread pool that runs worker tasks.
//!
//! Tasks are handed to a bounded channel and picked up by a fixed set of
//! named threads. A panicking task is caught and counted; the thread that
//! ran it keeps serving the queue.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::sync::CountDownLatch;

/// How often an idle thread re-checks the shutdown flag
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error when submitting a task to the thread pool
#[derive(Error, Debug)]
pub enum ThreadPoolError {
    /// The thread pool is shutting down
    #[error("thread pool is shutting down")]
    ShuttingDown,

    /// The task queue is full
    #[error("thread pool queue is full")]
    QueueFull,

    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Statistics about the thread pool
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadPoolStats {
    /// Number of tasks queued
    pub tasks_queued: u64,

    /// Number of tasks completed
    pub tasks_completed: u64,

    /// Number of tasks that panicked
    pub tasks_panicked: u64,

    /// Total task execution time (microseconds)
    pub total_execution_time_us: u64,

    /// Total time tasks spent queued (microseconds)
    pub total_queue_time_us: u64,

    /// Maximum task execution time (microseconds)
    pub max_execution_time_us: u64,
}

/// Configuration for the thread pool
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Maximum size of the task queue
    pub queue_size: usize,

    /// Number of worker threads
    pub max_threads: usize,

    /// Name prefix for worker threads
    pub thread_name_prefix: String,

    /// Whether to collect performance statistics
    pub collect_stats: bool,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            max_threads: num_cpus::get(),
            thread_name_prefix: "tally-worker".to_string(),
            collect_stats: true,
        }
    }
}

struct Task {
    func: Box<dyn FnOnce() + Send + 'static>,
    enqueued_at: Instant,
}

impl Task {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(f),
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Default)]
struct Counters {
    tasks_queued: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_panicked: AtomicU64,
    total_execution_time_us: AtomicU64,
    total_queue_time_us: AtomicU64,
    max_execution_time_us: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ThreadPoolStats {
        ThreadPoolStats {
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            total_execution_time_us: self.total_execution_time_us.load(Ordering::Relaxed),
            total_queue_time_us: self.total_queue_time_us.load(Ordering::Relaxed),
            max_execution_time_us: self.max_execution_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Shared state for one worker thread's loop
struct WorkerContext {
    receiver: Receiver<Task>,
    shutdown_flag: Arc<AtomicBool>,
    collect_stats: bool,
    counters: Arc<Counters>,
    exited: Arc<CountDownLatch>,
}

/// A fixed-size pool of threads executing queued closures
pub struct ThreadPool {
    task_sender: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
    is_shutting_down: Arc<AtomicBool>,
    counters: Arc<Counters>,
    exited: Arc<CountDownLatch>,
    config: ThreadPoolConfig,
}

impl ThreadPool {
    /// Create a thread pool with `threads` workers and default settings
    pub fn new(threads: usize) -> Result<Self, ThreadPoolError> {
        let config = ThreadPoolConfig {
            max_threads: threads,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create a thread pool with the specified configuration
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let (task_sender, task_receiver) = bounded(config.queue_size);
        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let exited = Arc::new(CountDownLatch::new(config.max_threads));

        info!(
            "Creating thread pool with {} workers and queue size {}",
            config.max_threads, config.queue_size
        );

        let mut workers = Vec::with_capacity(config.max_threads);

        for id in 0..config.max_threads {
            let ctx = WorkerContext {
                receiver: task_receiver.clone(),
                shutdown_flag: Arc::clone(&is_shutting_down),
                collect_stats: config.collect_stats,
                counters: Arc::clone(&counters),
                exited: Arc::clone(&exited),
            };

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, id))
                .spawn(move || Self::worker_loop(id, ctx));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {}: {}", id, e);
                    // Let the threads that did start drain out
                    is_shutting_down.store(true, Ordering::SeqCst);
                    return Err(ThreadPoolError::Spawn(e));
                }
            }
        }

        Ok(Self {
            task_sender,
            workers,
            is_shutting_down,
            counters,
            exited,
            config,
        })
    }

    fn worker_loop(id: usize, ctx: WorkerContext) {
        debug!("Worker {}: Starting", id);

        loop {
            if ctx.shutdown_flag.load(Ordering::SeqCst) && ctx.receiver.is_empty() {
                break;
            }

            match ctx.receiver.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(task) => Self::run_task(id, &ctx, task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Worker {}: Shutting down", id);
        ctx.exited.count_down();
    }

    fn run_task(id: usize, ctx: &WorkerContext, task: Task) {
        let queue_time = task.enqueued_at.elapsed();
        trace!(
            "Worker {}: Executing task (queue time: {:.2}ms)",
            id,
            queue_time.as_micros() as f64 / 1000.0
        );

        let exec_start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(task.func));
        let exec_time = exec_start.elapsed();

        if ctx.collect_stats {
            let exec_us = exec_time.as_micros() as u64;
            let counters = &ctx.counters;
            counters
                .total_queue_time_us
                .fetch_add(queue_time.as_micros() as u64, Ordering::Relaxed);
            counters
                .total_execution_time_us
                .fetch_add(exec_us, Ordering::Relaxed);
            counters
                .max_execution_time_us
                .fetch_max(exec_us, Ordering::Relaxed);
        }

        match result {
            Ok(()) => {
                trace!(
                    "Worker {}: Task completed in {:.2}ms",
                    id,
                    exec_time.as_micros() as f64 / 1000.0
                );
                if ctx.collect_stats {
                    ctx.counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                let message = e
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| e.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<unknown panic>");
                error!("Worker {}: Task panicked: {}", id, message);
                if ctx.collect_stats {
                    ctx.counters.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Queue a task; fails if the queue is full or the pool is shutting down
    pub fn execute<F>(&self, f: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(ThreadPoolError::ShuttingDown);
        }

        match self.task_sender.try_send(Task::new(f)) {
            Ok(()) => {
                if self.config.collect_stats {
                    self.counters.tasks_queued.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ThreadPoolError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(ThreadPoolError::ShuttingDown),
        }
    }

    /// Current statistics; all zero when collection is disabled
    pub fn stats(&self) -> ThreadPoolStats {
        if self.config.collect_stats {
            self.counters.snapshot()
        } else {
            ThreadPoolStats::default()
        }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks. Queued tasks still run; threads exit once the
    /// queue is empty.
    pub fn shutdown(&self) {
        if !self.is_shutting_down.swap(true, Ordering::SeqCst) {
            info!("Shutting down thread pool");
        }
    }

    /// Shut down and wait up to `timeout` for every thread to exit.
    ///
    /// Returns true if all threads were joined. Threads still running at the
    /// deadline are detached.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> bool {
        self.shutdown();

        if !self.exited.wait_timeout(timeout) {
            warn!(
                "Thread pool: {} of {} workers still running after {:?}, detaching",
                self.exited.count(),
                self.workers.len(),
                timeout
            );
            self.workers.clear();
            return false;
        }

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.join() {
                error!("Worker thread panicked during shutdown: {:?}", e);
            }
        }

        info!("Thread pool shutdown complete");
        true
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        debug!("Thread pool dropped; workers exit once the queue drains");
    }
}
