// SPDX-License-Identifier: MIT

//! Typed publish/subscribe event bus (§9 Design Notes).
//!
//! A thin wrapper over [`tokio::sync::broadcast`] so subsystems depend on a
//! small, purpose-named API (`publish`/`subscribe`) rather than the
//! broadcast channel directly. Bounded: a subscriber that falls behind
//! drops the oldest events rather than unbounded memory growth, and lagged
//! receivers simply resynchronize on the next `recv`.

use crate::event::Event;
use tokio::sync::broadcast;

/// Default channel capacity. Sized generously: state changes are rare
/// relative to log line throughput (which never touches the bus).
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every current subscriber. Publishing with zero
    /// subscribers is not an error — early in startup nobody may have
    /// subscribed yet.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
