//! Blocking pool over the FIFO [`FairMonitor`].

use crate::pool::{BlockingPool, Monitor, PoolKind};
use crate::sync::{CancelToken, Cancelled, FairMonitor, FairMonitorGuard};

/// Blocking pool whose lock is granted in arrival order
pub type MonitorPool = BlockingPool<FairMonitor<usize>>;

impl Monitor for FairMonitor<usize> {
    const KIND: PoolKind = PoolKind::FairMonitor;

    type Guard<'a>
        = FairMonitorGuard<'a, usize>
    where
        Self: 'a;

    fn with_free(free: usize) -> Self {
        FairMonitor::new(free)
    }

    fn enter(&self) -> Self::Guard<'_> {
        self.lock()
    }

    fn wait<'a>(
        &'a self,
        mut guard: Self::Guard<'a>,
        cancel: &CancelToken,
    ) -> Result<Self::Guard<'a>, Cancelled> {
        guard.wait(cancel)?;
        Ok(guard)
    }

    fn broadcast(&self, guard: &Self::Guard<'_>) {
        guard.notify_all();
    }
}
