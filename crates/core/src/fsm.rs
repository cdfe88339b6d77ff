// SPDX-License-Identifier: MIT

//! Program FSM (§4.C): the sole writer of a program's mutable state.
//!
//! Every public method here corresponds to one of the four events the FSM
//! accepts (`deps_satisfied`, `pattern_hit`, `exit`, `stop_requested`).
//! Transitions out of `final` are impossible — later events targeting a
//! final program are silently discarded, matching §4.C.

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::event::Event;
use crate::program::{ExitDisposition, Program, ProgramKind};
use crate::state::{BuiltinState, StateName};
use std::sync::Arc;

/// Owns the write path into a [`Program`]'s runtime state, publishing a
/// [`Event::StateChanged`] after every transition it records.
pub struct ProgramFsm {
    program: Arc<Program>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
}

impl ProgramFsm {
    pub fn new(program: Arc<Program>, clock: Arc<dyn Clock>, bus: EventBus) -> Self {
        Self {
            program,
            clock,
            bus,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Records `initialized` at (approximately) time zero. Called once by
    /// the Graph Controller right after the arena is built.
    pub fn record_initialized(&self) {
        let now = self.clock.elapsed();
        self.record_and_publish(StateName::Builtin(BuiltinState::Initialized), now);
    }

    /// `initialized -> started`, gated on the Dependency Scheduler.
    /// Returns `true` if the transition happened (the caller should then
    /// ask the Process Supervisor to spawn the child).
    pub fn deps_satisfied(&self) -> bool {
        let now = self.clock.elapsed();
        let mut rt = self.program.runtime.write();
        if rt.current != StateName::Builtin(BuiltinState::Initialized) {
            return false;
        }
        rt.current = StateName::Builtin(BuiltinState::Started);
        let recorded = *rt
            .state_times
            .entry(StateName::Builtin(BuiltinState::Started))
            .or_insert(now);
        drop(rt);
        self.publish(StateName::Builtin(BuiltinState::Started), recorded);
        true
    }

    /// `started | <user state> -> <user state>`. Ignored for programs
    /// still `initialized`, already in a terminal classification, or
    /// `final` — the Log Tailer should not be emitting pattern hits for
    /// those, but the FSM guards regardless.
    pub fn pattern_hit(&self, state: StateName) {
        let now = self.clock.elapsed();
        let mut rt = self.program.runtime.write();
        if rt.state_times.contains_key(&state) {
            // Already recorded by an earlier hit (e.g. the same pattern
            // matching on both stdout and stderr) — at most once per
            // (program, state).
            return;
        }
        let can_transition = matches!(rt.current, StateName::User(_))
            || rt.current == StateName::Builtin(BuiltinState::Started);
        if !can_transition {
            return;
        }
        rt.current = state.clone();
        rt.state_times.insert(state.clone(), now);
        drop(rt);
        self.publish(state, now);
    }

    /// Process exit: classifies the disposition per the program's kind and
    /// whether a stop had been requested, records the classification, then
    /// immediately advances to `final`.
    pub fn exit(&self, disposition: ExitDisposition) {
        let now = self.clock.elapsed();
        let mut rt = self.program.runtime.write();
        if rt.current.is_final() {
            return;
        }

        let never_started = rt.current == StateName::Builtin(BuiltinState::Initialized);
        let classification = classify_exit(self.program.spec.kind, &disposition, rt.stop_requested, never_started);

        rt.current = StateName::Builtin(classification);
        let classified_at = *rt.state_times.entry(StateName::Builtin(classification)).or_insert(now);
        rt.current = StateName::Builtin(BuiltinState::Final);
        let final_at = *rt
            .state_times
            .entry(StateName::Builtin(BuiltinState::Final))
            .or_insert(now);
        drop(rt);

        self.publish(StateName::Builtin(classification), classified_at);
        self.publish(StateName::Builtin(BuiltinState::Final), final_at);
    }

    /// Marks that a graceful stop was requested, for exit classification.
    /// If the program never started (its dependencies were never
    /// satisfied), there is no process to stop and no exit event will ever
    /// arrive, so the FSM resolves it to `stopped -> final` immediately.
    pub fn stop_requested(&self) -> StopOutcome {
        let now = self.clock.elapsed();
        let mut rt = self.program.runtime.write();
        if rt.current.is_final() {
            return StopOutcome::AlreadyFinal;
        }
        rt.stop_requested = true;

        if rt.current == StateName::Builtin(BuiltinState::Initialized) {
            rt.current = StateName::Builtin(BuiltinState::Stopped);
            let stopped_at = *rt
                .state_times
                .entry(StateName::Builtin(BuiltinState::Stopped))
                .or_insert(now);
            rt.current = StateName::Builtin(BuiltinState::Final);
            let final_at = *rt
                .state_times
                .entry(StateName::Builtin(BuiltinState::Final))
                .or_insert(now);
            drop(rt);
            self.publish(StateName::Builtin(BuiltinState::Stopped), stopped_at);
            self.publish(StateName::Builtin(BuiltinState::Final), final_at);
            return StopOutcome::ResolvedWithoutProcess;
        }

        StopOutcome::SignalChild
    }

    fn record_and_publish(&self, state: StateName, now: f64) {
        let mut rt = self.program.runtime.write();
        rt.current = state.clone();
        let recorded = *rt.state_times.entry(state.clone()).or_insert(now);
        drop(rt);
        self.publish(state, recorded);
    }

    fn publish(&self, state: StateName, at: f64) {
        self.bus.publish(Event::StateChanged {
            program: self.program.name().clone(),
            state,
            at,
        });
    }
}

/// What the caller should do after requesting a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The program had never started; it has already been resolved to
    /// `stopped -> final` without any process to signal.
    ResolvedWithoutProcess,
    /// A process is running; the caller must deliver the graceful-stop
    /// signal via the Process Supervisor.
    SignalChild,
    /// The program was already final; nothing to do.
    AlreadyFinal,
}

fn classify_exit(
    kind: ProgramKind,
    disposition: &ExitDisposition,
    stop_requested: bool,
    never_started: bool,
) -> BuiltinState {
    if never_started {
        // Spawn failure: initialized -> {action,service}_failure directly.
        return match kind {
            ProgramKind::Action => BuiltinState::ActionFailure,
            ProgramKind::Service => BuiltinState::ServiceFailure,
        };
    }
    match kind {
        ProgramKind::Action => {
            if disposition.is_success() {
                BuiltinState::ActionSuccess
            } else {
                BuiltinState::ActionFailure
            }
        }
        ProgramKind::Service => {
            if stop_requested {
                BuiltinState::Stopped
            } else {
                BuiltinState::ServiceFailure
            }
        }
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
