//! Pool without any concurrency control.
//!
//! The free count lives in an atomic only so the type is `Sync`; every
//! operation reads it, yields, then writes the new value back. Concurrent
//! callers can interleave between the read and the write and overwrite each
//! other's update. That lost update is what this variant exists to show.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::{PoolError, Result};
use crate::pool::{check_amount, credited, PoolKind, ResourcePool};
use crate::trace::{NullSink, Operation, TraceEvent, TraceSink};

/// A pool whose read-modify-write cycles are not atomic
pub struct UnsyncPool {
    capacity: usize,
    free: AtomicUsize,
    sink: Arc<dyn TraceSink>,
}

impl UnsyncPool {
    /// Create a full pool that discards trace events
    pub fn new(capacity: usize) -> Self {
        Self::with_sink(capacity, Arc::new(NullSink))
    }

    /// Create a full pool reporting to `sink`
    pub fn with_sink(capacity: usize, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            capacity,
            free: AtomicUsize::new(capacity),
            sink,
        }
    }

    fn emit(&self, operation: Operation, requested: usize, before: usize, after: usize) {
        self.sink.record(&TraceEvent::new(
            PoolKind::Unsynchronized,
            operation,
            requested,
            before,
            after,
        ));
    }
}

impl ResourcePool for UnsyncPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Unsynchronized
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn free(&self) -> usize {
        self.free.load(Ordering::Relaxed)
    }

    fn acquire(&self, amount: usize) -> Result<()> {
        check_amount(amount)?;

        let before = self.free.load(Ordering::Relaxed);
        if before < amount {
            return Err(PoolError::Insufficient {
                requested: amount,
                free: before,
            });
        }

        thread::yield_now();
        let after = before - amount;
        self.free.store(after, Ordering::Relaxed);

        self.emit(Operation::Acquire, amount, before, after);
        Ok(())
    }

    fn release(&self, amount: usize) -> Result<()> {
        check_amount(amount)?;

        let before = self.free.load(Ordering::Relaxed);
        thread::yield_now();
        let after = credited(before, amount, self.capacity);
        self.free.store(after, Ordering::Relaxed);

        self.emit(Operation::Release, amount, before, after);
        Ok(())
    }
}
