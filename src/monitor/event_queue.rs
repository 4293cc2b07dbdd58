use super::buttons::ButtonEvent;
use std::collections::VecDeque;

/// Bounded, lossy transition log.
///
/// A full queue evicts its oldest entry to make room, so the producer never
/// blocks and never loses the most recent transition.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<ButtonEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: ButtonEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    /// Removes and returns up to `max` events, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<ButtonEvent> {
        let count = max.min(self.events.len());
        self.events.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped to overflow since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
