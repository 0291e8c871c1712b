//! Bounded counting-resource pools.
//!
//! Four variants share the [`ResourcePool`] contract and differ only in how
//! they protect the free count:
//!
//! - [`UnsyncPool`]: no protection, loses updates under concurrency
//! - [`GuardedPool`]: one mutex, fails fast when short
//! - [`WaitPool`]: mutex plus condition, blocks until satisfiable
//! - [`MonitorPool`]: same as [`WaitPool`] over a FIFO monitor
//!
//! None of them track who holds which units. Releasing more than was
//! acquired is clamped at capacity and not reported.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::sync::CancelToken;

pub mod blocking;
pub mod guarded;
pub mod monitor;
pub mod unsync;
pub mod wait;

pub use blocking::{BlockingPool, Monitor};
pub use guarded::GuardedPool;
pub use monitor::MonitorPool;
pub use unsync::UnsyncPool;
pub use wait::{DefaultMonitor, WaitPool};

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 5;

/// The four pool variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
    /// [`UnsyncPool`]
    #[serde(rename = "naive")]
    Unsynchronized,
    /// [`GuardedPool`]
    #[serde(rename = "lock")]
    Guarded,
    /// [`WaitPool`]
    #[serde(rename = "wait")]
    ConditionWait,
    /// [`MonitorPool`]
    #[serde(rename = "monitor")]
    FairMonitor,
}

impl PoolKind {
    /// Short name used in traces and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsynchronized => "naive",
            Self::Guarded => "lock",
            Self::ConditionWait => "wait",
            Self::FairMonitor => "monitor",
        }
    }

    /// Whether `acquire` suspends instead of failing fast
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::ConditionWait | Self::FairMonitor)
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations every pool variant provides
pub trait ResourcePool: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> PoolKind;

    /// Maximum number of units in existence
    fn capacity(&self) -> usize;

    /// Units currently available; may be stale as soon as it returns
    fn free(&self) -> usize;

    /// Take `amount` units.
    ///
    /// Non-blocking variants fail with [`PoolError::Insufficient`] when short;
    /// blocking variants wait until enough units are free.
    fn acquire(&self, amount: usize) -> Result<()>;

    /// Return `amount` units; the free count is clamped at capacity
    fn release(&self, amount: usize) -> Result<()>;

    /// Reset the free count to capacity
    fn clear(&self) -> Result<()> {
        Err(PoolError::Unsupported {
            operation: "clear",
            pool: self.kind(),
        })
    }
}

/// Pools whose acquire suspends until it can be satisfied
pub trait BlockingResourcePool: ResourcePool {
    /// Acquire `amount` units, giving up with [`PoolError::Cancelled`] if
    /// `cancel` is set while suspended. A cancelled call debits nothing.
    fn acquire_cancellable(&self, amount: usize, cancel: &CancelToken) -> Result<()>;

    /// Number of callers currently suspended in acquire
    fn waiting(&self) -> usize;
}

pub(crate) fn check_amount(amount: usize) -> Result<()> {
    if amount == 0 {
        return Err(PoolError::InvalidArgument { amount });
    }
    Ok(())
}

/// Free count after returning `amount` units, clamped at `capacity`
pub(crate) fn credited(free: usize, amount: usize, capacity: usize) -> usize {
    free.saturating_add(amount).min(capacity)
}
