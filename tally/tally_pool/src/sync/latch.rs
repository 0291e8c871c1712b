//! One-shot countdown latch used to observe worker completion.

use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};

/// A latch that opens once it has been counted down to zero
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountDownLatch {
    /// Create a latch that opens after `count` calls to [`count_down`](Self::count_down)
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrement the count, waking every waiter when it reaches zero.
    ///
    /// Counting down an open latch has no effect. Returns the remaining count.
    pub fn count_down(&self) -> usize {
        let mut count = self.count.lock();

        if *count > 0 {
            *count -= 1;
            trace!("Latch counted down, {} remaining", *count);

            if *count == 0 {
                self.zero.notify_all();
            }
        }

        *count
    }

    /// Current count
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the count reaches zero
    pub fn wait(&self) {
        let mut count = self.count.lock();

        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or `timeout` elapses.
    ///
    /// Returns true if the latch opened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();

        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch_opens_after_all_count_down() {
        let workers = 4;
        let latch = Arc::new(CountDownLatch::new(workers));
        let exited = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let latch = Arc::clone(&latch);
                let exited = Arc::clone(&exited);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5 * i as u64));
                    exited.fetch_add(1, Ordering::SeqCst);
                    latch.count_down();
                })
            })
            .collect();

        latch.wait();
        assert_eq!(exited.load(Ordering::SeqCst), workers);
        assert_eq!(latch.count(), 0);

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_wait_timeout_expires() {
        let latch = CountDownLatch::new(1);
        assert!(!latch.wait_timeout(Duration::from_millis(20)));
        assert_eq!(latch.count(), 1);
    }

    #[test]
    fn test_count_down_saturates() {
        let latch = CountDownLatch::new(1);
        assert_eq!(latch.count_down(), 0);
        assert_eq!(latch.count_down(), 0);
        assert!(latch.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn test_zero_latch_is_open() {
        let latch = CountDownLatch::new(0);
        latch.wait();
        assert!(latch.wait_timeout(Duration::from_millis(1)));
    }
}
