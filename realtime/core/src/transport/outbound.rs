//! Outbound buffer
//!
//! Bounded FIFO of requests waiting for an open link. When the buffer is full
//! the [`OverflowPolicy`] decides what is lost; the default keeps the oldest
//! requests and rejects the newest.

use std::collections::VecDeque;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default number of requests held while disconnected
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 50;

/// What to discard when a push would exceed capacity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming item
    #[default]
    DropNewest,
    /// Evict the oldest queued item to make room
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop_newest" | "newest" => Ok(Self::DropNewest),
            "drop_oldest" | "oldest" => Ok(Self::DropOldest),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Result of offering an item to the buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored without loss
    Queued,
    /// Buffer was full; the offered item was discarded
    DroppedNewest,
    /// Buffer was full; the oldest item was evicted and the offered one stored
    DroppedOldest,
}

impl PushOutcome {
    /// Whether anything was lost
    #[must_use]
    pub fn dropped(self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// Bounded FIFO with an overflow policy
#[derive(Debug)]
pub struct OutboundBuffer<T> {
    queue: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> OutboundBuffer<T> {
    /// Create an empty buffer
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Append to the back
    pub fn push(&mut self, item: T) -> PushOutcome {
        if self.queue.len() < self.capacity {
            self.queue.push_back(item);
            return PushOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::DropNewest => PushOutcome::DroppedNewest,
            OverflowPolicy::DropOldest => {
                if self.queue.pop_front().is_none() {
                    // zero capacity
                    return PushOutcome::DroppedNewest;
                }
                self.queue.push_back(item);
                PushOutcome::DroppedOldest
            }
        }
    }

    /// Put an item that failed to transmit back at the front
    ///
    /// The item is older than everything queued, so on overflow the policy is
    /// applied relative to it: `DropNewest` evicts the back, `DropOldest`
    /// discards the returned item itself.
    pub fn requeue(&mut self, item: T) -> PushOutcome {
        if self.queue.len() < self.capacity {
            self.queue.push_front(item);
            return PushOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::DropNewest => {
                if self.queue.pop_back().is_none() {
                    return PushOutcome::DroppedOldest;
                }
                self.queue.push_front(item);
                PushOutcome::DroppedNewest
            }
            OverflowPolicy::DropOldest => PushOutcome::DroppedOldest,
        }
    }

    /// Take the oldest item
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the next push would overflow
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Maximum number of queued items
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queued items, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }
}
