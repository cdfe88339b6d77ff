// SPDX-License-Identifier: MIT

//! shepherd-engine: the graph-level components (§4.D, §4.E, §4.F) that
//! sit above `shepherd-core`'s single-program FSM and `shepherd-adapters`'
//! I/O, coordinating a whole run from start to the final artifact.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod arbiter;
pub mod controller;
pub mod scheduler;

pub use arbiter::ShutdownReason;
pub use controller::{run, RunOutcome, RunReport};
