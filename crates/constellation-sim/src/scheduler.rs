//! Discrete-event queue
//!
//! A min-heap on (time, sequence): events at the same instant run in the
//! order they were scheduled. Every event may carry the node it executes on,
//! which becomes the current context while it is being handled.

use orbital_glaf::NodeId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// An event handed back by [`Simulator::pop_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled<E> {
    pub id: EventId,
    pub time: Duration,
    pub context: Option<NodeId>,
    pub event: E,
}

#[derive(Debug)]
struct Entry<E>(Scheduled<E>);

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl<E> Eq for Entry<E> {}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .time
            .cmp(&self.0.time)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct Simulator<E> {
    now: Duration,
    queue: BinaryHeap<Entry<E>>,
    live: HashSet<EventId>,
    next_id: u64,
    context: Option<NodeId>,
    processed: u64,
}

impl<E> Default for Simulator<E> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
            context: None,
            processed: 0,
        }
    }
}

impl<E> Simulator<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Node the event being handled runs on.
    pub fn current_context(&self) -> Option<NodeId> {
        self.context
    }

    /// Events scheduled and neither run nor cancelled.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Schedules `event` after `delay`, inheriting the current context.
    pub fn schedule(&mut self, delay: Duration, event: E) -> EventId {
        self.push(self.context, delay, event)
    }

    pub fn schedule_with_context(&mut self, context: NodeId, delay: Duration, event: E) -> EventId {
        self.push(Some(context), delay, event)
    }

    /// Returns false if the event already ran or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id)
    }

    /// Pops the next live event due at or before `limit` and advances the clock to it.
    pub fn pop_until(&mut self, limit: Duration) -> Option<Scheduled<E>> {
        loop {
            if self.queue.peek()?.0.time > limit {
                return None;
            }
            let Entry(scheduled) = self.queue.pop()?;
            if !self.live.remove(&scheduled.id) {
                continue;
            }
            self.now = scheduled.time;
            self.context = scheduled.context;
            self.processed += 1;
            return Some(scheduled);
        }
    }

    /// Moves the clock forward to `limit` once the queue is drained up to it.
    pub fn advance_to(&mut self, limit: Duration) {
        if limit > self.now {
            self.now = limit;
        }
        self.context = None;
    }

    fn push(&mut self, context: Option<NodeId>, delay: Duration, event: E) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.queue.push(Entry(Scheduled {
            id,
            time: self.now.saturating_add(delay),
            context,
            event,
        }));
        id
    }
}
