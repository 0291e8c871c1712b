//! Mutex with contention statistics.
//!
//! Wraps a `parking_lot` mutex and records how often it was entered, how long
//! callers waited for it and how long it was held.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Mutex, MutexGuard};

/// Statistics about lock usage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockStats {
    /// Number of successful lock acquisitions
    pub acquisition_count: u64,

    /// Total time spent waiting for the lock (microseconds)
    pub total_wait_time_us: u64,

    /// Total time the lock was held (microseconds)
    pub total_hold_time_us: u64,

    /// Maximum time spent waiting for the lock (microseconds)
    pub max_wait_time_us: u64,

    /// Maximum time the lock was held (microseconds)
    pub max_hold_time_us: u64,
}

impl LockStats {
    /// Average wait divided by average hold; higher means more contention
    pub fn contention_factor(&self) -> f64 {
        if self.acquisition_count == 0 || self.total_hold_time_us == 0 {
            return 0.0;
        }

        self.total_wait_time_us as f64 / self.total_hold_time_us as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: AtomicU64,
    total_wait_us: AtomicU64,
    total_hold_us: AtomicU64,
    max_wait_us: AtomicU64,
    max_hold_us: AtomicU64,
}

impl Counters {
    fn record_wait(&self, waited: Duration) {
        let us = waited.as_micros() as u64;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_wait_us.fetch_add(us, Ordering::Relaxed);
        self.max_wait_us.fetch_max(us, Ordering::Relaxed);
    }

    fn record_hold(&self, held: Duration) {
        let us = held.as_micros() as u64;
        self.total_hold_us.fetch_add(us, Ordering::Relaxed);
        self.max_hold_us.fetch_max(us, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LockStats {
        LockStats {
            acquisition_count: self.acquisitions.load(Ordering::Relaxed),
            total_wait_time_us: self.total_wait_us.load(Ordering::Relaxed),
            total_hold_time_us: self.total_hold_us.load(Ordering::Relaxed),
            max_wait_time_us: self.max_wait_us.load(Ordering::Relaxed),
            max_hold_time_us: self.max_hold_us.load(Ordering::Relaxed),
        }
    }
}

/// A mutex with usage statistics
#[derive(Debug)]
pub struct TrackedMutex<T> {
    mutex: Mutex<T>,
    counters: Counters,
    name: &'static str,
}

/// A guard for a [`TrackedMutex`]; records the hold time when dropped
pub struct TrackedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    acquired_at: Instant,
    counters: &'a Counters,
    name: &'static str,
}

impl<T> TrackedMutex<T> {
    /// Create a new tracked mutex with a name for log output
    pub fn new(value: T, name: &'static str) -> Self {
        Self {
            mutex: Mutex::new(value),
            counters: Counters::default(),
            name,
        }
    }

    /// Lock the mutex
    pub fn lock(&self) -> TrackedMutexGuard<'_, T> {
        let start = Instant::now();
        let guard = self.mutex.lock();
        let waited = start.elapsed();
        self.counters.record_wait(waited);

        trace!(
            "Lock acquired: {} (wait time: {:.2}ms)",
            self.name,
            waited.as_secs_f64() * 1000.0
        );

        TrackedMutexGuard {
            guard,
            acquired_at: Instant::now(),
            counters: &self.counters,
            name: self.name,
        }
    }

    /// Statistics gathered so far
    pub fn stats(&self) -> LockStats {
        self.counters.snapshot()
    }

    /// Name given at construction
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Drop for TrackedMutexGuard<'_, T> {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        self.counters.record_hold(held);

        trace!(
            "Lock released: {} (held for: {:.2}ms)",
            self.name,
            held.as_secs_f64() * 1000.0
        );
    }
}

impl<T> Deref for TrackedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for TrackedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
