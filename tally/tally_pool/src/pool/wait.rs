//! Blocking pool over the platform's default mutex and condition variable.
//!
//! The standard mutex makes no ordering promise: a thread that is already
//! running can take the lock ahead of one that a broadcast just woke. Under
//! steady traffic of small requests a large request can lose that race
//! indefinitely. [`MonitorPool`](super::MonitorPool) removes the race.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::pool::{BlockingPool, Monitor, PoolKind};
use crate::sync::{CancelToken, Cancelled, CANCEL_POLL_INTERVAL};

/// Blocking pool that may starve large requests
pub type WaitPool = BlockingPool<DefaultMonitor>;

/// `std` mutex plus condition variable
#[derive(Debug)]
pub struct DefaultMonitor {
    free: Mutex<usize>,
    available: Condvar,
}

impl Monitor for DefaultMonitor {
    const KIND: PoolKind = PoolKind::ConditionWait;

    type Guard<'a>
        = MutexGuard<'a, usize>
    where
        Self: 'a;

    fn with_free(free: usize) -> Self {
        Self {
            free: Mutex::new(free),
            available: Condvar::new(),
        }
    }

    fn enter(&self) -> Self::Guard<'_> {
        // The count is a plain integer and every update is a single store,
        // so a panic elsewhere cannot leave it half-written.
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        cancel: &CancelToken,
    ) -> Result<Self::Guard<'a>, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let (guard, _) = self
            .available
            .wait_timeout(guard, CANCEL_POLL_INTERVAL)
            .unwrap_or_else(PoisonError::into_inner);

        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        Ok(guard)
    }

    fn broadcast(&self, _guard: &Self::Guard<'_>) {
        self.available.notify_all();
    }
}
