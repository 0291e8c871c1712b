//! A monitor that grants its lock in strict arrival order.
//!
//! [`FairMonitor`] is a ticket queue layered over a `parking_lot` mutex and
//! condition variable. Entering the monitor draws the next ticket and waits
//! until that ticket is served, so threads blocked on entry are admitted
//! first-come first-served.
//!
//! The monitor also carries one condition. A thread that waits on it gives
//! up its turn and parks. A broadcast, issued while the broadcaster still
//! holds the monitor, hands every parked thread an entry ticket in the order
//! in which they parked. Woken threads therefore rejoin the entry queue in
//! FIFO order and cannot be overtaken by threads that arrive later.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};

use log::trace;
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::cancel::{CancelToken, Cancelled, CANCEL_POLL_INTERVAL};

#[derive(Debug, Default)]
struct TicketQueue {
    /// Ticket handed to the next thread that asks for entry
    next_ticket: u64,

    /// Ticket currently allowed inside the monitor
    now_serving: u64,

    /// Identifier for the next condition waiter
    next_waiter: u64,

    /// Condition waiters in parking order
    parked: VecDeque<u64>,

    /// Entry tickets assigned to broadcast waiters, keyed by waiter id
    granted: HashMap<u64, u64>,
}

impl TicketQueue {
    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }
}

/// A mutual-exclusion monitor with FIFO entry and FIFO condition wakeup
pub struct FairMonitor<T> {
    queue: Mutex<TicketQueue>,
    turn: Condvar,
    data: Mutex<T>,
}

/// Proof of being inside a [`FairMonitor`]; leaving passes the turn on
pub struct FairMonitorGuard<'a, T> {
    monitor: &'a FairMonitor<T>,
    data: MutexGuard<'a, T>,
}

impl<T> FairMonitor<T> {
    /// Create a monitor protecting `value`
    pub fn new(value: T) -> Self {
        Self {
            queue: Mutex::new(TicketQueue::default()),
            turn: Condvar::new(),
            data: Mutex::new(value),
        }
    }

    /// Enter the monitor, blocking behind every thread that asked earlier
    pub fn lock(&self) -> FairMonitorGuard<'_, T> {
        {
            let mut queue = self.queue.lock();
            let ticket = queue.take_ticket();
            self.wait_turn(&mut queue, ticket);
        }

        // Only the ticket holder touches `data`, so this never contends for long.
        FairMonitorGuard {
            monitor: self,
            data: self.data.lock(),
        }
    }

    /// Threads holding a ticket that has not been served yet
    pub fn waiting_for_entry(&self) -> usize {
        let queue = self.queue.lock();
        (queue.next_ticket - queue.now_serving).saturating_sub(1) as usize
    }

    /// Threads parked on the condition
    pub fn parked(&self) -> usize {
        self.queue.lock().parked.len()
    }

    /// Consume the monitor and return the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn wait_turn(&self, queue: &mut MutexGuard<'_, TicketQueue>, ticket: u64) {
        while queue.now_serving != ticket {
            self.turn.wait(queue);
        }
    }

    fn pass_turn(&self) {
        let mut queue = self.queue.lock();
        queue.now_serving += 1;
        self.turn.notify_all();
    }

    /// Park on the condition and come back holding the turn again.
    ///
    /// The caller must hold the turn and must already have released `data`.
    fn park(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        let mut queue = self.queue.lock();
        let id = queue.next_waiter;
        queue.next_waiter += 1;
        queue.parked.push_back(id);

        queue.now_serving += 1;
        self.turn.notify_all();

        let (ticket, outcome) = loop {
            if let Some(ticket) = queue.granted.remove(&id) {
                break (ticket, Ok(()));
            }

            if cancel.is_cancelled() {
                queue.parked.retain(|waiter| *waiter != id);
                let ticket = queue.take_ticket();
                trace!("Fair monitor waiter {} cancelled, requeued as {}", id, ticket);
                break (ticket, Err(Cancelled));
            }

            self.turn.wait_for(&mut queue, CANCEL_POLL_INTERVAL);
        };

        self.wait_turn(&mut queue, ticket);
        outcome
    }
}

impl<T: Default> Default for FairMonitor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for FairMonitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("FairMonitor")
            .field("now_serving", &queue.now_serving)
            .field("next_ticket", &queue.next_ticket)
            .field("parked", &queue.parked.len())
            .finish_non_exhaustive()
    }
}

impl<T> FairMonitorGuard<'_, T> {
    /// Wait on the monitor's condition.
    ///
    /// Leaves the monitor while parked and re-enters before returning, after
    /// every thread that was queued ahead of it. Returns `Err(Cancelled)` if
    /// the token was cancelled while parked; the guard holds the monitor in
    /// both cases. Callers must re-check their predicate after every return.
    pub fn wait(&mut self, cancel: &CancelToken) -> Result<(), Cancelled> {
        let monitor = self.monitor;
        MutexGuard::unlocked(&mut self.data, || monitor.park(cancel))
    }

    /// Wake every parked thread, queueing them for entry in parking order.
    ///
    /// Returns the number of threads woken.
    pub fn notify_all(&self) -> usize {
        let mut queue = self.monitor.queue.lock();
        let woken = queue.parked.len();

        while let Some(id) = queue.parked.pop_front() {
            let ticket = queue.take_ticket();
            queue.granted.insert(id, ticket);
        }

        if woken > 0 {
            self.monitor.turn.notify_all();
        }

        woken
    }
}

impl<T> Drop for FairMonitorGuard<'_, T> {
    fn drop(&mut self) {
        self.monitor.pass_turn();
    }
}

impl<T> Deref for FairMonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for FairMonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
