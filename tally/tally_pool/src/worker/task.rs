//! Worker task that repeatedly acquires, holds and releases pool units.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};
use serde::Serialize;

use crate::error::PoolError;
use crate::pool::BlockingResourcePool;
use crate::sync::{CancelToken, CountDownLatch};
use crate::worker::sampler::LoadSampler;

/// Where a worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Between iterations
    Running,
    /// Blocked in, or about to call, acquire
    Acquiring,
    /// Holding units during the simulated work delay
    Holding,
    /// Returning units
    Releasing,
    /// Finished, normally or by cancellation
    Completed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Acquiring => "acquiring",
            Self::Holding => "holding",
            Self::Releasing => "releasing",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What a worker did before it completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerOutcome {
    /// Worker identifier
    pub id: usize,

    /// Iterations that acquired and released
    pub iterations: usize,

    /// Units acquired over the run
    pub acquired: usize,

    /// Units handed back over the run (before clamping)
    pub released: usize,

    /// Whether the worker stopped because it was cancelled
    pub cancelled: bool,

    /// Error that ended the loop early, other than cancellation
    #[serde(skip)]
    pub error: Option<PoolError>,

    /// Time spent inside acquire, summed
    pub total_acquire_wait: Duration,

    /// Longest single acquire
    pub max_acquire_wait: Duration,
}

impl WorkerOutcome {
    fn new(id: usize) -> Self {
        Self {
            id,
            iterations: 0,
            acquired: 0,
            released: 0,
            cancelled: false,
            error: None,
            total_acquire_wait: Duration::ZERO,
            max_acquire_wait: Duration::ZERO,
        }
    }

    fn record_wait(&mut self, waited: Duration) {
        self.total_acquire_wait += waited;
        self.max_acquire_wait = self.max_acquire_wait.max(waited);
    }
}

/// Counts the latch down when dropped, whichever way the loop ends
struct CompletionSignal(Arc<CountDownLatch>);

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// A fixed number of acquire/hold/release rounds against one blocking pool.
///
/// The amount released each round is drawn independently of the amount
/// acquired, so a worker may hand back more or less than it took. The
/// pool clamps any surplus at capacity.
pub struct WorkerTask<S> {
    id: usize,
    repetitions: usize,
    pool: Arc<dyn BlockingResourcePool>,
    sampler: S,
    latch: Arc<CountDownLatch>,
    cancel: CancelToken,
    state: WorkerState,
}

impl<S: LoadSampler> WorkerTask<S> {
    /// Create a worker bound to `pool` that counts `latch` down on exit
    pub fn new(
        id: usize,
        repetitions: usize,
        pool: Arc<dyn BlockingResourcePool>,
        sampler: S,
        latch: Arc<CountDownLatch>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            id,
            repetitions,
            pool,
            sampler,
            latch,
            cancel,
            state: WorkerState::Running,
        }
    }

    /// Current state
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the loop to completion.
    ///
    /// The latch is counted down exactly once per task; running a completed
    /// task again does nothing.
    pub fn run(&mut self) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::new(self.id);

        if self.state == WorkerState::Completed {
            warn!("Worker {}: already completed", self.id);
            return outcome;
        }

        let _signal = CompletionSignal(Arc::clone(&self.latch));
        debug!(
            "Worker {}: starting {} iterations on {} pool",
            self.id,
            self.repetitions,
            self.pool.kind()
        );

        for _ in 0..self.repetitions {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let need = self.sampler.request_size();
            self.transition(WorkerState::Acquiring);

            let started = Instant::now();
            match self.pool.acquire_cancellable(need, &self.cancel) {
                Ok(()) => outcome.record_wait(started.elapsed()),
                Err(PoolError::Cancelled) => {
                    debug!("Worker {}: cancelled while waiting for {}", self.id, need);
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Worker {}: acquire of {} failed: {}", self.id, need, e);
                    outcome.error = Some(e);
                    break;
                }
            }
            outcome.acquired += need;

            self.transition(WorkerState::Holding);
            let hold = self.sampler.delay();
            self.cancel.sleep(hold);

            self.transition(WorkerState::Releasing);
            let give = self.sampler.request_size();
            match self.pool.release(give) {
                Ok(()) => outcome.released += give,
                Err(e) => warn!("Worker {}: release of {} failed: {}", self.id, give, e),
            }
            outcome.iterations += 1;

            self.transition(WorkerState::Running);
            let pause = self.sampler.delay();
            self.cancel.sleep(pause);
        }

        self.transition(WorkerState::Completed);
        debug!(
            "Worker {}: completed {} iterations (cancelled: {})",
            self.id, outcome.iterations, outcome.cancelled
        );

        outcome
    }

    fn transition(&mut self, next: WorkerState) {
        trace!("Worker {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}
