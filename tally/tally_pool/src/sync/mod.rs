//! Synchronization primitives used by the pools and the harness.
//!
//! - [`FairMonitor`]: ticket-queue monitor with FIFO entry and FIFO wakeup
//! - [`TrackedMutex`]: mutex that records contention statistics
//! - [`CountDownLatch`]: one-shot completion latch
//! - [`CancelToken`]: cooperative cancellation flag

pub mod cancel;
pub mod fair;
pub mod latch;
pub mod lock;

pub use cancel::{CancelToken, Cancelled, CANCEL_POLL_INTERVAL};
pub use fair::{FairMonitor, FairMonitorGuard};
pub use latch::CountDownLatch;
pub use lock::{LockStats, TrackedMutex, TrackedMutexGuard};
