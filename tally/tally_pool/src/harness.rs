//! Drives concurrent load against the blocking pools and reports the result.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, PoolError};
use crate::executor::{ThreadPool, ThreadPoolConfig};
use crate::pool::{
    BlockingResourcePool, GuardedPool, MonitorPool, PoolKind, ResourcePool, UnsyncPool, WaitPool,
};
use crate::sync::{CancelToken, CountDownLatch};
use crate::trace::{NullSink, Operation, TraceSink};
use crate::worker::{UniformSampler, WorkerOutcome, WorkerTask};

/// Which blocking variants a run exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Condition-wait, then fair monitor
    #[default]
    Both,
    /// Condition-wait pool only
    Waiting,
    /// Fair monitor pool only
    Monitor,
}

impl Mode {
    /// Variants in the order they run
    pub fn variants(&self) -> &'static [PoolKind] {
        match self {
            Self::Both => &[PoolKind::ConditionWait, PoolKind::FairMonitor],
            Self::Waiting => &[PoolKind::ConditionWait],
            Self::Monitor => &[PoolKind::FairMonitor],
        }
    }
}

/// Error for an unrecognised mode name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode '{0}', expected one of: waiting, monitor, both")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(Self::Both),
            "waiting" => Ok(Self::Waiting),
            "monitor" => Ok(Self::Monitor),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Both => "both",
            Self::Waiting => "waiting",
            Self::Monitor => "monitor",
        };
        f.write_str(name)
    }
}

/// One call made by the single-threaded sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleStep {
    /// Pool the call was made on
    pub pool: PoolKind,
    /// Operation performed
    pub operation: Operation,
    /// Amount passed to the call
    pub amount: usize,
    /// What the pool returned
    pub result: Result<(), PoolError>,
}

/// Outcome of the single-threaded sample on the non-blocking pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    /// Every call in order
    pub steps: Vec<SampleStep>,
    /// Free units left in the unsynchronized pool
    pub unsync_free: usize,
    /// Free units in the guarded pool before it was cleared
    pub guarded_free: usize,
    /// Free units in the guarded pool after clearing
    pub guarded_cleared: usize,
}

impl SampleReport {
    /// Steps that did not succeed
    pub fn failures(&self) -> impl Iterator<Item = &SampleStep> {
        self.steps.iter().filter(|step| step.result.is_err())
    }
}

/// Result of driving one blocking variant
#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    /// Variant exercised
    pub variant: PoolKind,
    /// Workers launched
    pub workers: usize,
    /// Iterations each worker was asked to run
    pub iterations: usize,
    /// Free units after every worker stopped
    pub final_free: usize,
    /// Wall time from first launch until the latch opened or gave up
    pub elapsed: Duration,
    /// Whether the completion wait ran out and workers were cancelled
    pub timed_out: bool,
    /// Workers that stopped because they were cancelled
    pub cancelled_workers: usize,
    /// Worker tasks that panicked
    pub panicked_workers: u64,
    /// Longest single acquire across all workers
    pub max_acquire_wait: Duration,
    /// Per-worker results, by worker id
    pub outcomes: Vec<WorkerOutcome>,
}

impl HarnessReport {
    /// Iterations completed across all workers
    pub fn completed_iterations(&self) -> usize {
        self.outcomes.iter().map(|o| o.iterations).sum()
    }
}

impl fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ends free={} ({} workers, {}/{} iterations, {:.2?}, max acquire wait {:.2?}",
            self.variant,
            self.final_free,
            self.workers,
            self.completed_iterations(),
            self.workers * self.iterations,
            self.elapsed,
            self.max_acquire_wait
        )?;
        if self.timed_out {
            write!(f, ", timed out, {} cancelled", self.cancelled_workers)?;
        }
        f.write_str(")")
    }
}

/// Sample plus one report per selected blocking variant
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Single-threaded sample
    pub sample: SampleReport,
    /// Blocking variants in the order they ran
    pub variants: Vec<HarnessReport>,
}

/// Runs the sample and the concurrent demonstrations
pub struct Harness {
    config: HarnessConfig,
    sink: Arc<dyn TraceSink>,
}

impl Harness {
    /// Create a harness that discards trace events
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            config,
            sink: Arc::new(NullSink),
        })
    }

    /// Send trace events of every pool the harness builds to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Single-threaded walk through the two non-blocking pools:
    /// acquire 3, release 2, acquire 4 on each, then clear the guarded pool.
    pub fn run_sample(&self) -> SampleReport {
        let capacity = self.config.capacity;
        let mut steps = Vec::new();

        let naive = UnsyncPool::with_sink(capacity, Arc::clone(&self.sink));
        Self::sample_sequence(&naive, &mut steps);
        let unsync_free = naive.free();
        info!("naive ends free={}", unsync_free);

        let guarded = GuardedPool::with_sink(capacity, Arc::clone(&self.sink));
        Self::sample_sequence(&guarded, &mut steps);
        let guarded_free = guarded.free();
        debug!(
            "lock pool contention factor {:.2}",
            guarded.lock_stats().contention_factor()
        );

        let cleared = guarded.clear();
        steps.push(SampleStep {
            pool: PoolKind::Guarded,
            operation: Operation::Clear,
            amount: capacity,
            result: cleared,
        });
        let guarded_cleared = guarded.free();
        info!("lock ends free={} after clear", guarded_cleared);

        SampleReport {
            steps,
            unsync_free,
            guarded_free,
            guarded_cleared,
        }
    }

    fn sample_sequence(pool: &dyn ResourcePool, steps: &mut Vec<SampleStep>) {
        let calls = [
            (Operation::Acquire, 3),
            (Operation::Release, 2),
            (Operation::Acquire, 4),
        ];

        for (operation, amount) in calls {
            let result = match operation {
                Operation::Release => pool.release(amount),
                _ => pool.acquire(amount),
            };
            if let Err(e) = &result {
                info!("{} not enough for {}: {}", pool.kind(), amount, e);
            }
            steps.push(SampleStep {
                pool: pool.kind(),
                operation,
                amount,
                result,
            });
        }
    }

    /// Run the configured number of workers against a fresh pool of `kind`.
    ///
    /// If the workers do not finish within the completion timeout they are
    /// cancelled and given the shutdown timeout to stop; the report then
    /// has `timed_out` set. That is not an error.
    pub fn run_blocking(&self, kind: PoolKind) -> Result<HarnessReport, HarnessError> {
        let config = &self.config;
        let pool: Arc<dyn BlockingResourcePool> = match kind {
            PoolKind::ConditionWait => {
                Arc::new(WaitPool::with_sink(config.capacity, Arc::clone(&self.sink)))
            }
            PoolKind::FairMonitor => {
                Arc::new(MonitorPool::with_sink(config.capacity, Arc::clone(&self.sink)))
            }
            other => return Err(HarnessError::NotBlocking(other)),
        };

        info!(
            "{}: starting {} workers x {} iterations on capacity {}",
            kind, config.workers, config.iterations, config.capacity
        );

        let executor = ThreadPool::with_config(ThreadPoolConfig {
            queue_size: config.workers,
            max_threads: config.workers,
            thread_name_prefix: format!("tally-{}", kind),
            collect_stats: true,
        })?;

        let latch = Arc::new(CountDownLatch::new(config.workers));
        let cancel = CancelToken::new();
        let (outcome_tx, outcome_rx) = unbounded();
        let started = Instant::now();

        for id in 0..config.workers {
            let sampler = UniformSampler::new(
                config.request_range(),
                config.delay_range_us(),
                config.worker_seed(id),
            );
            let mut task = WorkerTask::new(
                id,
                config.iterations,
                Arc::clone(&pool),
                sampler,
                Arc::clone(&latch),
                cancel.clone(),
            );
            let outcome_tx = outcome_tx.clone();

            let submitted = executor.execute(move || {
                let outcome = task.run();
                // The receiver outlives the executor; a failed send only
                // happens if the run was abandoned
                let _ = outcome_tx.send(outcome);
            });

            if let Err(e) = submitted {
                warn!("{}: failed to schedule worker {}: {}", kind, id, e);
                cancel.cancel();
                executor.shutdown_timeout(config.shutdown_timeout());
                return Err(e.into());
            }
        }
        drop(outcome_tx);

        let timed_out = !latch.wait_timeout(config.completion_timeout());
        if timed_out {
            warn!(
                "{}: {} workers still running after {:?}, cancelling",
                kind,
                latch.count(),
                config.completion_timeout()
            );
            cancel.cancel();
            if !latch.wait_timeout(config.shutdown_timeout()) {
                warn!("{}: {} workers did not stop", kind, latch.count());
            }
        }
        let elapsed = started.elapsed();

        let panicked_workers = executor.stats().tasks_panicked;
        if !executor.shutdown_timeout(config.shutdown_timeout()) {
            warn!("{}: thread pool did not terminate in time", kind);
        }

        let mut outcomes: Vec<WorkerOutcome> = outcome_rx.try_iter().collect();
        outcomes.sort_by_key(|outcome| outcome.id);

        let report = HarnessReport {
            variant: kind,
            workers: config.workers,
            iterations: config.iterations,
            final_free: pool.free(),
            elapsed,
            timed_out,
            cancelled_workers: outcomes.iter().filter(|o| o.cancelled).count(),
            panicked_workers,
            max_acquire_wait: outcomes
                .iter()
                .map(|o| o.max_acquire_wait)
                .max()
                .unwrap_or_default(),
            outcomes,
        };

        info!("{}", report);
        Ok(report)
    }

    /// Run the sample, then each variant selected by `mode`
    pub fn run(&self, mode: Mode) -> Result<RunReport, HarnessError> {
        let sample = self.run_sample();

        let variants = mode
            .variants()
            .iter()
            .map(|&kind| self.run_blocking(kind))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Done.");
        Ok(RunReport { sample, variants })
    }
}
