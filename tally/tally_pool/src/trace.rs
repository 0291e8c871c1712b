//! Observability hook for pool operations.
//!
//! Every successful state change of a pool produces a [`TraceEvent`] that is
//! handed to the pool's [`TraceSink`]. Locked pools emit from inside their
//! critical section, so a sink sees events in lock order and the recorded
//! `(before, after)` pairs of one pool form a chain.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::pool::PoolKind;

/// The kind of state change a trace event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Units were taken from the pool
    Acquire,
    /// Units were returned to the pool
    Release,
    /// The pool was reset to full capacity
    Clear,
}

impl Operation {
    /// Verb used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "takes",
            Self::Release => "gives",
            Self::Clear => "clears",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed state change of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Variant that emitted the event
    pub pool: PoolKind,

    /// What happened
    pub operation: Operation,

    /// Amount requested by the caller
    pub requested: usize,

    /// Free units before the operation
    pub before: usize,

    /// Free units after the operation
    pub after: usize,
}

impl TraceEvent {
    /// Create a new trace event
    pub fn new(
        pool: PoolKind,
        operation: Operation,
        requested: usize,
        before: usize,
        after: usize,
    ) -> Self {
        Self {
            pool,
            operation,
            requested,
            before,
            after,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}={}, before={}, after={}",
            self.pool, self.operation, self.requested, self.before, self.after
        )
    }
}

/// Receiver of trace events.
///
/// Sinks are called while a locked pool holds its lock, so implementations
/// must not call back into the pool.
pub trait TraceSink: Send + Sync {
    /// Record one event
    fn record(&self, event: &TraceEvent);
}

impl<S: TraceSink + ?Sized> TraceSink for Arc<S> {
    fn record(&self, event: &TraceEvent) {
        (**self).record(event)
    }
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&self, _event: &TraceEvent) {}
}

/// Sink that forwards events to the `log` facade at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, event: &TraceEvent) {
        info!(target: "tally::trace", "{}", event);
    }
}

/// Sink that writes one JSON object per line
pub struct JsonSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonSink {
    /// Create a sink writing to the given writer
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Create a sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl TraceSink for JsonSink {
    fn record(&self, event: &TraceEvent) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));

        if let Err(e) = written {
            warn!("Failed to write trace event: {}", e);
        }
    }
}

impl fmt::Debug for JsonSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSink").finish_non_exhaustive()
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events in arrival order
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no event has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Index of the first event whose `before` does not match the previous
    /// event's `after`, considering only events of `pool`
    pub fn first_chain_break(&self, pool: PoolKind) -> Option<usize> {
        let events = self.events.lock();
        let filtered: Vec<&TraceEvent> = events.iter().filter(|e| e.pool == pool).collect();
        first_chain_break(filtered.into_iter())
    }

    /// Whether the events of `pool` form an unbroken `(before, after)` chain
    pub fn is_linearizable(&self, pool: PoolKind) -> bool {
        self.first_chain_break(pool).is_none()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: &TraceEvent) {
        self.events.lock().push(*event);
    }
}

/// Position of the first event that does not continue the chain
pub fn first_chain_break<'a>(events: impl IntoIterator<Item = &'a TraceEvent>) -> Option<usize> {
    let mut previous_after: Option<usize> = None;

    for (index, event) in events.into_iter().enumerate() {
        if let Some(after) = previous_after {
            if event.before != after {
                return Some(index);
            }
        }
        previous_after = Some(event.after);
    }

    None
}
