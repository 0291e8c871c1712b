//! Blocking pool over an abstract monitor.
//!
//! [`BlockingPool`] implements the wait-and-recheck algorithm once. The lock
//! discipline comes from the [`Monitor`] it is instantiated with:
//! [`DefaultMonitor`](super::DefaultMonitor) lets running threads barge
//! ahead of woken ones, [`FairMonitor`](crate::sync::FairMonitor) admits
//! strictly in arrival order.

use std::ops::DerefMut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::error::{PoolError, Result};
use crate::pool::{check_amount, credited, BlockingResourcePool, PoolKind, ResourcePool};
use crate::sync::{CancelToken, Cancelled};
use crate::trace::{NullSink, Operation, TraceEvent, TraceSink};

/// A lock protecting a free count together with one wait condition
pub trait Monitor: Send + Sync {
    /// Pool variant built on this monitor
    const KIND: PoolKind;

    /// Proof of holding the lock; dereferences to the free count
    type Guard<'a>: DerefMut<Target = usize>
    where
        Self: 'a;

    /// Create a monitor holding `free`
    fn with_free(free: usize) -> Self
    where
        Self: Sized;

    /// Enter the monitor
    fn enter(&self) -> Self::Guard<'_>;

    /// Release the lock, suspend on the condition and reacquire before
    /// returning. Returning does not imply the caller's predicate holds.
    /// On cancellation the guard is dropped, which releases the lock.
    fn wait<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        cancel: &CancelToken,
    ) -> std::result::Result<Self::Guard<'a>, Cancelled>;

    /// Wake every thread suspended on the condition
    fn broadcast(&self, guard: &Self::Guard<'_>);
}

/// A pool whose acquire waits until enough units are free
pub struct BlockingPool<M: Monitor> {
    capacity: usize,
    monitor: M,
    waiting: AtomicUsize,
    sink: Arc<dyn TraceSink>,
}

impl<M: Monitor> BlockingPool<M> {
    /// Create a full pool that discards trace events
    pub fn new(capacity: usize) -> Self {
        Self::with_sink(capacity, Arc::new(NullSink))
    }

    /// Create a full pool reporting to `sink`
    pub fn with_sink(capacity: usize, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            capacity,
            monitor: M::with_free(capacity),
            waiting: AtomicUsize::new(0),
            sink,
        }
    }

    fn emit(&self, operation: Operation, requested: usize, before: usize, after: usize) {
        self.sink.record(&TraceEvent::new(
            M::KIND,
            operation,
            requested,
            before,
            after,
        ));
    }
}

impl<M: Monitor> ResourcePool for BlockingPool<M> {
    fn kind(&self) -> PoolKind {
        M::KIND
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn free(&self) -> usize {
        *self.monitor.enter()
    }

    fn acquire(&self, amount: usize) -> Result<()> {
        self.acquire_cancellable(amount, &CancelToken::new())
    }

    fn release(&self, amount: usize) -> Result<()> {
        check_amount(amount)?;

        let mut free = self.monitor.enter();
        let before = *free;
        *free = credited(before, amount, self.capacity);
        self.emit(Operation::Release, amount, before, *free);

        // Waiters need different amounts; wake all so each re-checks its own
        self.monitor.broadcast(&free);
        Ok(())
    }
}

impl<M: Monitor> BlockingResourcePool for BlockingPool<M> {
    fn acquire_cancellable(&self, amount: usize, cancel: &CancelToken) -> Result<()> {
        check_amount(amount)?;
        if amount > self.capacity {
            return Err(PoolError::ExceedsCapacity {
                requested: amount,
                capacity: self.capacity,
            });
        }

        let mut free = self.monitor.enter();

        while *free < amount {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let woken = self.monitor.wait(free, cancel);
            self.waiting.fetch_sub(1, Ordering::SeqCst);

            free = woken.map_err(|cancelled| {
                debug!("{} pool: acquire of {} cancelled while waiting", M::KIND, amount);
                PoolError::from(cancelled)
            })?;
        }

        let before = *free;
        *free = before - amount;
        self.emit(Operation::Acquire, amount, before, *free);
        Ok(())
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
