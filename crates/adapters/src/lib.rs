// SPDX-License-Identifier: MIT

//! shepherd-adapters: the two components that touch the outside world —
//! the Log Tailer (§4.A) watching files for pattern matches, and the
//! Process Supervisor (§4.B) spawning and reaping child processes.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod supervisor;
pub mod watcher;

pub use supervisor::{run as run_supervisor, GRACE_PERIOD};
pub use watcher::spawn as spawn_watcher;
