//! Pool guarded by a single mutex that fails fast on shortage.

use std::sync::Arc;

use crate::error::{PoolError, Result};
use crate::pool::{check_amount, credited, PoolKind, ResourcePool};
use crate::sync::{LockStats, TrackedMutex};
use crate::trace::{NullSink, Operation, TraceEvent, TraceSink};

/// A pool whose operations are each one critical section.
///
/// Acquire never waits: if fewer than the requested units are free it
/// returns [`PoolError::Insufficient`] and leaves the pool unchanged.
pub struct GuardedPool {
    capacity: usize,
    free: TrackedMutex<usize>,
    sink: Arc<dyn TraceSink>,
}

impl GuardedPool {
    /// Create a full pool that discards trace events
    pub fn new(capacity: usize) -> Self {
        Self::with_sink(capacity, Arc::new(NullSink))
    }

    /// Create a full pool reporting to `sink`
    pub fn with_sink(capacity: usize, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            capacity,
            free: TrackedMutex::new(capacity, "guarded-pool"),
            sink,
        }
    }

    /// Contention statistics of the pool lock
    pub fn lock_stats(&self) -> LockStats {
        self.free.stats()
    }

    fn emit(&self, operation: Operation, requested: usize, before: usize, after: usize) {
        self.sink.record(&TraceEvent::new(
            PoolKind::Guarded,
            operation,
            requested,
            before,
            after,
        ));
    }
}

impl ResourcePool for GuardedPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Guarded
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn free(&self) -> usize {
        *self.free.lock()
    }

    fn acquire(&self, amount: usize) -> Result<()> {
        check_amount(amount)?;

        let mut free = self.free.lock();
        if *free < amount {
            return Err(PoolError::Insufficient {
                requested: amount,
                free: *free,
            });
        }

        let before = *free;
        *free = before - amount;
        self.emit(Operation::Acquire, amount, before, *free);
        Ok(())
    }

    fn release(&self, amount: usize) -> Result<()> {
        check_amount(amount)?;

        let mut free = self.free.lock();
        let before = *free;
        *free = credited(before, amount, self.capacity);
        self.emit(Operation::Release, amount, before, *free);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut free = self.free.lock();
        let before = *free;
        *free = self.capacity;
        self.emit(Operation::Clear, self.capacity - before, before, *free);
        Ok(())
    }
}
