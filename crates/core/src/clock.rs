// SPDX-License-Identifier: MIT

//! Monotonic clock abstraction.
//!
//! Every program's `state_times` is recorded as seconds elapsed since a
//! single origin captured once by the Graph Controller at startup. Tests
//! substitute [`FakeClock`] so that timing assertions don't depend on wall
//! clock jitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic time, relative to a fixed origin.
pub trait Clock: Send + Sync + 'static {
    /// Seconds elapsed since this clock's origin.
    fn elapsed(&self) -> f64;
}

/// Real clock anchored to the instant it is constructed.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Deterministic clock for tests: advances only when told to.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    // Stored as millis so the clock is cheaply `Clone`-able via `Arc` while
    // still being mutated through a shared handle.
    millis: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, secs: f64) {
        let add = (secs * 1000.0).round() as u64;
        self.millis.fetch_add(add, Ordering::SeqCst);
    }

    pub fn set(&self, secs: f64) {
        self.millis
            .store((secs * 1000.0).round() as u64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn elapsed(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}
