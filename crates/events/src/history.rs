//! Bounded, insertion-ordered event history for catch-up reads.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::event::DomainEvent;
use crate::filter::EventFilter;

/// Default number of events retained by a bus.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// FIFO ring of the most recent events.
///
/// Once `capacity` is exceeded the oldest entry is evicted. Entries are never
/// mutated after insertion. A capacity of zero retains nothing.
#[derive(Debug, Clone)]
pub struct EventHistory {
    capacity: usize,
    events: VecDeque<DomainEvent>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event, returning the entry evicted to make room (if any).
    pub fn push(&mut self, event: DomainEvent) -> Option<DomainEvent> {
        if self.capacity == 0 {
            return Some(event);
        }

        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainEvent> {
        self.events.iter()
    }

    /// Events strictly newer than `since` and matching `filter`, oldest first.
    pub fn select(&self, since: Option<DateTime<Utc>>, filter: Option<&EventFilter>) -> Vec<DomainEvent> {
        self.events
            .iter()
            .filter(|e| since.is_none_or(|s| e.timestamp() > s))
            .filter(|e| filter.is_none_or(|f| f.matches(e)))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
