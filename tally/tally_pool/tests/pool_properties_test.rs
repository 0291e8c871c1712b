//! Integration tests for the behaviour shared by the pool variants.
//!
//! Covers the range invariant, the linearizable trace of the locked pools,
//! blocking and clamping, and completion of a batch of worker tasks.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tally_pool::pool::DEFAULT_CAPACITY;
use tally_pool::sync::{CancelToken, CountDownLatch};
use tally_pool::trace::MemorySink;
use tally_pool::worker::{UniformSampler, WorkerTask};
use tally_pool::{
    BlockingResourcePool, GuardedPool, MonitorPool, PoolError, PoolKind, ResourcePool, UnsyncPool,
    WaitPool,
};

fn blocking_pools(sink: &Arc<MemorySink>) -> Vec<Arc<dyn BlockingResourcePool>> {
    let wait: Arc<dyn BlockingResourcePool> =
        Arc::new(WaitPool::with_sink(DEFAULT_CAPACITY, sink.clone()));
    let monitor: Arc<dyn BlockingResourcePool> =
        Arc::new(MonitorPool::with_sink(DEFAULT_CAPACITY, sink.clone()));
    vec![wait, monitor]
}

fn all_pools(sink: &Arc<MemorySink>) -> Vec<Arc<dyn ResourcePool>> {
    let mut pools: Vec<Arc<dyn ResourcePool>> = Vec::new();
    pools.push(Arc::new(UnsyncPool::with_sink(DEFAULT_CAPACITY, sink.clone())));
    pools.push(Arc::new(GuardedPool::with_sink(DEFAULT_CAPACITY, sink.clone())));
    pools.push(Arc::new(WaitPool::with_sink(DEFAULT_CAPACITY, sink.clone())));
    pools.push(Arc::new(MonitorPool::with_sink(DEFAULT_CAPACITY, sink.clone())));
    pools
}

#[test]
fn test_end_to_end_scenario() {
    let sink = Arc::new(MemorySink::new());

    for pool in all_pools(&sink) {
        pool.acquire(3).unwrap();
        assert_eq!(pool.free(), 2);

        pool.release(2).unwrap();
        assert_eq!(pool.free(), 4);

        pool.acquire(4).unwrap();
        assert_eq!(pool.free(), 0, "{} pool", pool.kind());
    }

    for kind in [
        PoolKind::Guarded,
        PoolKind::ConditionWait,
        PoolKind::FairMonitor,
    ] {
        assert!(sink.is_linearizable(kind));
    }
}

#[test]
fn test_release_never_exceeds_capacity() {
    let sink = Arc::new(MemorySink::new());

    for pool in all_pools(&sink) {
        pool.acquire(1).unwrap();
        pool.release(4).unwrap();
        assert_eq!(pool.free(), pool.capacity());
        pool.release(1).unwrap();
        assert_eq!(pool.free(), pool.capacity());
    }

    assert!(sink.events().iter().all(|e| e.after <= DEFAULT_CAPACITY));
}

#[test]
fn test_zero_amounts_rejected_everywhere() {
    let sink = Arc::new(MemorySink::new());

    for pool in all_pools(&sink) {
        assert_eq!(pool.acquire(0), Err(PoolError::InvalidArgument { amount: 0 }));
        assert_eq!(pool.release(0), Err(PoolError::InvalidArgument { amount: 0 }));
        assert_eq!(pool.free(), DEFAULT_CAPACITY);
    }

    assert!(sink.is_empty());
}

#[test]
fn test_guarded_clear_resets_after_any_sequence() {
    let pool = GuardedPool::new(DEFAULT_CAPACITY);

    for amounts in [[1, 2], [3, 1], [2, 2], [5, 0]] {
        for amount in amounts.into_iter().filter(|&a| a > 0) {
            let _ = pool.acquire(amount);
        }
        pool.clear().unwrap();
        assert_eq!(pool.free(), DEFAULT_CAPACITY);
    }
}

#[test]
fn test_blocking_acquire_debits_exactly_at_wake() {
    let sink = Arc::new(MemorySink::new());

    for pool in blocking_pools(&sink) {
        pool.acquire(5).unwrap();

        let pool_clone = Arc::clone(&pool);
        let waiter = thread::spawn(move || pool_clone.acquire(4));

        while pool.waiting() != 1 {
            thread::sleep(Duration::from_millis(1));
        }

        pool.release(2).unwrap();
        pool.release(3).unwrap();
        waiter.join().unwrap().unwrap();

        assert_eq!(pool.free(), 1);

        let last = *sink.events().last().unwrap();
        assert_eq!(last.requested, 4);
        assert_eq!(last.before - last.after, 4);
    }
}

#[test]
fn test_concurrent_blocking_traffic_is_linearizable() {
    let sink = Arc::new(MemorySink::new());

    for pool in blocking_pools(&sink) {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for j in 0..100 {
                        let amount = (i + j) % 3 + 1;
                        pool.acquire(amount).unwrap();
                        thread::yield_now();
                        pool.release(amount).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.free(), DEFAULT_CAPACITY);
        assert_eq!(pool.waiting(), 0);
    }

    assert!(sink.is_linearizable(PoolKind::ConditionWait));
    assert!(sink.is_linearizable(PoolKind::FairMonitor));
    assert!(sink.events().iter().all(|e| e.after <= DEFAULT_CAPACITY));
}

#[test]
fn test_latch_opens_when_every_worker_exits() {
    let workers = 6;
    let sink = Arc::new(MemorySink::new());

    for pool in blocking_pools(&sink) {
        let latch = Arc::new(CountDownLatch::new(workers));
        let cancel = CancelToken::new();

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let sampler = UniformSampler::new(1..=3, 0..=100, Some(id as u64));
                let mut task = WorkerTask::new(
                    id,
                    10,
                    Arc::clone(&pool),
                    sampler,
                    Arc::clone(&latch),
                    cancel.clone(),
                );
                thread::spawn(move || task.run())
            })
            .collect();

        // Mismatched releases can leave the pool too low for some worker;
        // cancel whatever is still blocked after a generous wait
        if !latch.wait_timeout(Duration::from_secs(10)) {
            cancel.cancel();
        }
        latch.wait();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.len(), workers);
        assert_eq!(latch.count(), 0);
        assert!(pool.free() <= DEFAULT_CAPACITY);
    }
}
