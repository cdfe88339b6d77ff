// SPDX-License-Identifier: MIT

//! Events published on the [`crate::EventBus`]. The Dependency Scheduler and
//! the Terminal-Condition Arbiter are the primary subscribers; each filters
//! the broadcast stream down to the programs/states it actually cares about.

use crate::program::{ExitDisposition, ProgramId};
use crate::state::StateName;

/// A state change published after the Program FSM records it. `StateChanged`
/// covers every transition, including `started`, user states, terminal
/// classifications, and `final` — subscribers distinguish by `state`.
#[derive(Debug, Clone)]
pub enum Event {
    /// Raised by the Dependency Scheduler once a program's predicate is
    /// satisfied. Does not itself mean the program is `started` — §4.B
    /// requires a spawn failure to skip `started` entirely, so the
    /// Process Supervisor (not the Scheduler) is the one that calls
    /// `ProgramFsm::deps_satisfied` once the child has actually spawned.
    DepsSatisfied {
        program: ProgramId,
    },
    StateChanged {
        program: ProgramId,
        state: StateName,
        at: f64,
    },
    /// Raised by the Process Supervisor the moment a child exits, before
    /// the FSM has classified it. Used only for internal bookkeeping
    /// (e.g. the Graph Controller's idle-vs-shutdown loop); the
    /// authoritative classification arrives as a subsequent `StateChanged`.
    ProcessExited {
        program: ProgramId,
        disposition: ExitDisposition,
    },
    /// Raised once, when every program has reached a `final` state without
    /// the Arbiter having intervened.
    AllProgramsFinal,
}

impl Event {
    pub fn program(&self) -> Option<&ProgramId> {
        match self {
            Event::DepsSatisfied { program } => Some(program),
            Event::StateChanged { program, .. } => Some(program),
            Event::ProcessExited { program, .. } => Some(program),
            Event::AllProgramsFinal => None,
        }
    }
}
