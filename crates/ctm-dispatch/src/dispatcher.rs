//! `Dispatcher` — the priority-ordered event queue that owns simulated time.
//!
//! # Ordering
//!
//! Events are keyed by `(timestamp, priority, sequence)`.  `sequence` is a
//! strictly increasing insertion counter, so events with identical
//! timestamp and priority fire in the order they were scheduled.  A
//! `BTreeMap` keyed this way gives O(log n) insert/pop and lets
//! [`cancel_for_recipient`](Dispatcher::cancel_for_recipient) scan in order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ctm_core::SimTime;
use tracing::trace;

use crate::{Action, Event, EventKind, Recipient};

/// Key for ordering queued events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct EventKey {
    time:     SimTime,
    priority: u8,
    sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Receives every event popped by [`Dispatcher::run_until_stopped`].
///
/// The handler gets mutable access to the dispatcher so it can schedule
/// continuations, cancel pending events, or raise the stop flag.
pub trait EventHandler {
    type Error;

    fn handle(&mut self, event: Event, dispatcher: &mut Dispatcher) -> Result<(), Self::Error>;
}

/// Discrete-event scheduler driving simulated time.
#[derive(Debug, Default)]
pub struct Dispatcher {
    queue:        BTreeMap<EventKey, Action>,
    current_time: SimTime,
    next_seq:     u64,
    stopped:      bool,
    dispatched:   u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher whose clock starts at `start`.
    pub fn starting_at(start: SimTime) -> Self {
        Self { current_time: start, ..Self::default() }
    }

    /// Clear all pending events, lower the stop flag, and set the clock.
    pub fn reset(&mut self, start: SimTime) {
        self.queue.clear();
        self.current_time = start;
        self.stopped = false;
        self.dispatched = 0;
    }

    // ── Scheduling ────────────────────────────────────────────────────────

    /// Enqueue `action` at `timestamp`.
    ///
    /// Timestamps strictly before the current time are silently discarded;
    /// returns `false` in that case.
    pub fn schedule(&mut self, timestamp: SimTime, action: Action) -> bool {
        if timestamp < self.current_time {
            trace!(%timestamp, now = %self.current_time, ?action, "discarding event in the past");
            return false;
        }
        let key = EventKey { time: timestamp, priority: action.priority(), sequence: self.next_seq };
        self.next_seq += 1;
        self.queue.insert(key, action);
        true
    }

    /// Enqueue `action` `delay_secs` after the current time.
    pub fn schedule_in(&mut self, delay_secs: f64, action: Action) -> bool {
        self.schedule(self.current_time + delay_secs, action)
    }

    /// Remove every queued event addressed to `recipient` whose action is of
    /// `kind`.  Returns the number of events removed.
    pub fn cancel_for_recipient(&mut self, recipient: Recipient, kind: EventKind) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|_, action| !(action.recipient() == recipient && action.kind() == kind));
        let removed = before - self.queue.len();
        if removed > 0 {
            trace!(?recipient, ?kind, removed, "cancelled pending events");
        }
        removed
    }

    // ── Execution ─────────────────────────────────────────────────────────

    /// Pop the next event and advance the clock to its timestamp.
    ///
    /// Returns `None` when the queue is empty or the stop flag is raised.
    pub fn pop_next(&mut self) -> Option<Event> {
        if self.stopped {
            return None;
        }
        let (key, action) = self.queue.pop_first()?;
        self.current_time = key.time;
        self.dispatched += 1;
        Some(Event { timestamp: key.time, priority: key.priority, action })
    }

    /// Dispatch events until the queue is empty or the stop flag is raised.
    ///
    /// A handler error raises the stop flag and is returned immediately; the
    /// failing event is not retried.  Returns the number of events handled.
    pub fn run_until_stopped<H: EventHandler>(&mut self, handler: &mut H) -> Result<u64, H::Error> {
        let start = self.dispatched;
        while let Some(event) = self.pop_next() {
            trace!(%event, "dispatch");
            if let Err(e) = handler.handle(event, self) {
                self.stopped = true;
                return Err(e);
            }
        }
        Ok(self.dispatched - start)
    }

    /// Raise the stop flag.  The event currently executing still completes.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Timestamp of the next queued event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|k| k.time)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total events dispatched since construction or the last `reset`.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Pending events addressed to `recipient`, in dispatch order.
    pub fn pending_for(&self, recipient: Recipient) -> Vec<Event> {
        self.queue
            .iter()
            .filter(|(_, action)| action.recipient() == recipient)
            .map(|(key, action)| Event {
                timestamp: key.time,
                priority:  key.priority,
                action:    action.clone(),
            })
            .collect()
    }
}
