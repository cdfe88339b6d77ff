// SPDX-License-Identifier: MIT

//! Dependency Scheduler (§4.D): evaluates each program's `all`/`any`
//! dependency predicate as a watermark over peer state — "has the peer
//! reached or passed the required state" rather than "is the peer
//! currently in that state" — and publishes `DepsSatisfied` exactly once
//! per program.
//!
//! Grounded in the teacher's `engine::scheduler::Scheduler`, restructured
//! from timer bookkeeping (`fires_at <= now`) to dependency-predicate
//! bookkeeping driven by [`Event::StateChanged`] instead of a poll clock.
//! Publishes rather than calling `ProgramFsm::deps_satisfied` directly: a
//! spawn failure must skip `started` entirely (§4.B), which only the
//! Process Supervisor can know, so the Scheduler's role ends at "this
//! program is now eligible to run".

use indexmap::IndexMap;
use shepherd_core::event::Event;
use shepherd_core::program::{DependencyMode, Program, ProgramId};
use shepherd_core::state::StateName;
use shepherd_core::EventBus;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Runs until every program has had its dependencies satisfied (or the
/// bus closes because the Graph Controller dropped it). Programs with no
/// dependencies are resolved immediately.
pub async fn run(programs: Arc<IndexMap<ProgramId, Arc<Program>>>, bus: EventBus, mut events: broadcast::Receiver<Event>) {
    let mut pending: Vec<ProgramId> = programs.keys().cloned().collect();

    pending.retain(|id| !try_satisfy(id, &programs, &bus));
    if pending.is_empty() {
        return;
    }

    loop {
        match events.recv().await {
            Ok(Event::StateChanged { .. }) => {
                pending.retain(|id| !try_satisfy(id, &programs, &bus));
                if pending.is_empty() {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // A burst of state changes was missed; re-check everything
                // still pending rather than risk leaving a program stuck.
                pending.retain(|id| !try_satisfy(id, &programs, &bus));
                if pending.is_empty() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Attempts to resolve `id`'s dependency predicate. Returns `true` once
/// `DepsSatisfied` has been published for it — either just now or because
/// it already had been, either way this program is done.
fn try_satisfy(id: &ProgramId, programs: &IndexMap<ProgramId, Arc<Program>>, bus: &EventBus) -> bool {
    let Some(program) = programs.get(id) else {
        return true;
    };
    if program.is_final() {
        // A stop requested before this program ever started already
        // resolved it straight to `stopped -> final` (§9 boundary case).
        // A dependency becoming satisfied after that point — e.g. a peer
        // reaching its success state during the shutdown grace window —
        // must not spawn a process for a program the FSM already closed
        // out.
        return true;
    }
    if !deps_satisfied(program, programs) {
        return false;
    }
    bus.publish(Event::DepsSatisfied { program: id.clone() });
    true
}

/// Evaluates `program`'s dependency predicate against the current
/// snapshot of peer state.
fn deps_satisfied(program: &Program, programs: &IndexMap<ProgramId, Arc<Program>>) -> bool {
    let deps = &program.spec.deps;
    if deps.items.is_empty() {
        return true;
    }

    let reached = |peer_name: &str, state_name: &str| -> bool {
        let Some(peer) = programs.get(peer_name) else {
            return false;
        };
        peer.has_reached(&StateName::from(state_name))
    };

    match deps.mode {
        DependencyMode::All => deps.items.iter().all(|(peer, state)| reached(peer, state)),
        DependencyMode::Any => deps.items.iter().any(|(peer, state)| reached(peer, state)),
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
