//! Overtaking tests for the two blocking pools.
//!
//! A thread asking for a large amount parks while the pool is empty. The
//! main thread then releases exactly enough for it and immediately asks for
//! the same amount again. With the fair monitor the parked thread is always
//! served first. With the default monitor the main thread, which never
//! went to sleep, can take the lock first and the parked request loses.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tally_pool::pool::{BlockingPool, DefaultMonitor, Monitor};
use tally_pool::sync::FairMonitor;
use tally_pool::trace::{Operation, TraceEvent, TraceSink};
use tally_pool::{BlockingResourcePool, ResourcePool};

const ROUNDS: usize = 30;
const LARGE: usize = 3;

const SMALL_REQUESTERS: usize = 4;
const CYCLING_ROUNDS: usize = 5;
// Each small requester stops after this many cycles, so the whole-pool
// request is eventually served even by a barging monitor
const MAX_CYCLES: usize = 200_000;

/// Records which thread performed each acquire
#[derive(Default)]
struct AcquirerSink {
    acquirers: Mutex<Vec<String>>,
}

impl AcquirerSink {
    fn first_acquirer(&self) -> Option<String> {
        self.acquirers.lock().unwrap().first().cloned()
    }
}

impl TraceSink for AcquirerSink {
    fn record(&self, event: &TraceEvent) {
        if event.operation == Operation::Acquire && event.requested == LARGE {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            self.acquirers.lock().unwrap().push(name);
        }
    }
}

/// Runs one round and returns true if the parked thread was served first
fn parked_request_wins<M: Monitor + 'static>() -> bool {
    let sink = Arc::new(AcquirerSink::default());
    let pool = Arc::new(BlockingPool::<M>::with_sink(5, sink.clone()));

    pool.acquire(5).unwrap();

    let pool_clone = Arc::clone(&pool);
    let large = thread::Builder::new()
        .name("large".to_string())
        .spawn(move || {
            pool_clone.acquire(LARGE).unwrap();
            pool_clone.release(LARGE).unwrap();
        })
        .unwrap();

    while pool.waiting() != 1 {
        thread::sleep(Duration::from_millis(1));
    }

    pool.release(LARGE).unwrap();
    pool.acquire(LARGE).unwrap();
    pool.release(LARGE).unwrap();

    large.join().unwrap();
    pool.release(2).unwrap();
    assert_eq!(pool.free(), 5);

    sink.first_acquirer().as_deref() == Some("large")
}

#[test]
fn test_monitor_pool_serves_parked_request_first() {
    for round in 0..ROUNDS {
        assert!(
            parked_request_wins::<FairMonitor<usize>>(),
            "round {}: a later request overtook the parked one",
            round
        );
    }
}

#[test]
fn test_wait_pool_lets_later_request_overtake() {
    // Documents the limitation of the default monitor rather than a goal
    let overtaken = (0..ROUNDS)
        .filter(|_| !parked_request_wins::<DefaultMonitor>())
        .count();

    assert!(
        overtaken > 0,
        "the parked request won all {} rounds; no barging observed",
        ROUNDS
    );
}

/// Counts small acquires completed between the whole-pool request being
/// made and it being served
fn small_acquires_ahead<M: Monitor + 'static>() -> usize {
    let pool = Arc::new(BlockingPool::<M>::new(5));
    let requested = Arc::new(AtomicBool::new(false));
    let served = Arc::new(AtomicBool::new(false));
    let ahead = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let smalls: Vec<_> = (0..SMALL_REQUESTERS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let requested = Arc::clone(&requested);
            let served = Arc::clone(&served);
            let ahead = Arc::clone(&ahead);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                started.fetch_add(1, Ordering::SeqCst);
                for _ in 0..MAX_CYCLES {
                    if served.load(Ordering::SeqCst) {
                        break;
                    }
                    pool.acquire(1).unwrap();
                    if requested.load(Ordering::SeqCst) && !served.load(Ordering::SeqCst) {
                        ahead.fetch_add(1, Ordering::SeqCst);
                    }
                    pool.release(1).unwrap();
                }
            })
        })
        .collect();

    while started.load(Ordering::SeqCst) < SMALL_REQUESTERS {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(2));

    requested.store(true, Ordering::SeqCst);
    pool.acquire(5).unwrap();
    served.store(true, Ordering::SeqCst);
    pool.release(5).unwrap();

    for small in smalls {
        small.join().unwrap();
    }
    assert_eq!(pool.free(), 5);
    assert_eq!(pool.waiting(), 0);

    ahead.load(Ordering::SeqCst)
}

fn median_ahead<M: Monitor + 'static>() -> usize {
    let mut counts: Vec<_> = (0..CYCLING_ROUNDS)
        .map(|_| small_acquires_ahead::<M>())
        .collect();
    counts.sort_unstable();
    counts[CYCLING_ROUNDS / 2]
}

#[test]
fn test_cycling_small_requests_do_not_starve_large_one() {
    let monitor = median_ahead::<FairMonitor<usize>>();
    let wait = median_ahead::<DefaultMonitor>();

    // Under the fair monitor only requesters already queued can finish
    // first; the barging monitor lets them keep cycling past
    assert!(
        monitor <= 256,
        "monitor pool let a median of {} small acquires ahead",
        monitor
    );
    assert!(
        monitor < wait,
        "monitor pool median {} is not below wait pool median {}",
        monitor,
        wait
    );
}
