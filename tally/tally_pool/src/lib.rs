#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Tally Pool
//!
//! Bounded counting-resource pools, from an unsynchronized baseline to a
//! FIFO-fair monitor, plus the workers and harness that drive them.
//!
//! This crate provides:
//!
//! - Four pool variants behind one [`ResourcePool`] trait
//! - A ticket-queue [`FairMonitor`](sync::FairMonitor) with FIFO entry and wakeup
//! - Worker tasks with cooperative cancellation and a completion latch
//! - A fixed-size thread pool and a harness that reports on each run
//! - A trace hook that records every state change for inspection
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tally_pool::{MonitorPool, PoolKind, ResourcePool};
//! use tally_pool::trace::MemorySink;
//!
//! let sink = Arc::new(MemorySink::new());
//! let pool = MonitorPool::with_sink(5, sink.clone());
//!
//! pool.acquire(3).unwrap();
//! pool.release(2).unwrap();
//! pool.acquire(4).unwrap();
//!
//! assert_eq!(pool.free(), 0);
//! assert!(sink.is_linearizable(PoolKind::FairMonitor));
//! ```

/// Harness configuration
pub mod config;

/// Error types
pub mod error;

/// Fixed-size thread pool for worker tasks
pub mod executor;

/// Concurrent demonstration runs
pub mod harness;

/// The pool variants and their shared contract
pub mod pool;

/// Synchronization primitives used by the pools and harness
pub mod sync;

/// Observability hook for pool operations
pub mod trace;

/// Worker tasks and load samplers
pub mod worker;

// Re-export key types for easier access
pub use config::HarnessConfig;
pub use error::{ConfigError, HarnessError, PoolError};
pub use executor::ThreadPool;
pub use harness::{Harness, HarnessReport, Mode, RunReport};
pub use pool::{
    BlockingResourcePool, GuardedPool, MonitorPool, PoolKind, ResourcePool, UnsyncPool, WaitPool,
};
pub use sync::CancelToken;
