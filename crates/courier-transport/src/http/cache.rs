//! Bounded per-session event cache for HTTP polling.

use std::collections::VecDeque;

use serde_json::Value;

/// FIFO of encoded events with a fixed capacity.
///
/// Pushing into a full cache evicts the oldest event. Polling is lossy for
/// clients that fall behind by more than `capacity` events.
#[derive(Debug)]
pub struct EventCache {
    events: VecDeque<Value>,
    capacity: usize,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Appends an event; returns `true` if the oldest one was evicted.
    pub fn push(&mut self, event: Value) -> bool {
        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front();
            true
        } else {
            false
        };
        self.events.push_back(event);
        evicted
    }

    /// Removes up to `count` events, oldest first.
    pub fn drain_oldest(&mut self, count: usize) -> Vec<Value> {
        let n = count.min(self.events.len());
        self.events.drain(..n).collect()
    }

    /// Removes up to `count` events, newest first.
    pub fn drain_newest(&mut self, count: usize) -> Vec<Value> {
        let n = count.min(self.events.len());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(event) = self.events.pop_back() {
                out.push(event);
            }
        }
        out
    }

    /// Up to `count` events, oldest first, without removing them.
    pub fn peek_oldest(&self, count: usize) -> Vec<Value> {
        self.events.iter().take(count).cloned().collect()
    }

    /// Up to `count` events, newest first, without removing them.
    pub fn peek_newest(&self, count: usize) -> Vec<Value> {
        self.events.iter().rev().take(count).cloned().collect()
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
}
