// SPDX-License-Identifier: MIT

//! Graph Controller (§4.F): builds the program arena from a validated
//! [`shepherd_config::Config`], wires components A through E together,
//! and drives the run from `initialized` to the final state-times
//! artifact.
//!
//! Grounded in the teacher's `engine::runtime::Runtime`: a struct that
//! owns the shared components and coordinates them, narrowed here to
//! spec.md §4.F's five-step lifecycle (initialize, run, detect a
//! terminal condition, shut down gracefully, emit the artifact) instead
//! of the teacher's long-lived daemon loop.

use indexmap::IndexMap;
use shepherd_adapters::{run_supervisor, spawn_watcher};
use shepherd_config::Config;
use shepherd_core::clock::Clock;
use shepherd_core::event::Event;
use shepherd_core::program::{Program, ProgramId};
use shepherd_core::state::{BuiltinState, StateName};
use shepherd_core::{EventBus, ProgramFsm, RuntimeError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::arbiter::{self, ArbiterConfig, ShutdownReason};
use crate::scheduler;

/// How long the shutdown sequence waits for every program to reach
/// `final` before giving up and reporting an incomplete shutdown.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// The default stop signal sent to a program's process group when no
/// `stop_signal` override is meaningful at the process level — the
/// config's `stop_signal` path names a *file*, not a POSIX signal; the
/// Process Supervisor always uses `SIGTERM` for the graceful request
/// (§4.B), escalating to `SIGKILL` after its own grace period.
pub fn default_signal() -> nix::sys::signal::Signal {
    nix::sys::signal::Signal::SIGTERM
}

/// Overall result of a run, independent of *why* it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every program reached a non-failure terminal classification (or
    /// `success_criteria` was satisfied) before any timeout or signal.
    Success,
    /// At least one program ended in `action_failure` or
    /// `service_failure`.
    Failure,
    /// `max_run_time` elapsed before the run otherwise concluded.
    TimedOut,
    /// The `stop_signal` file appeared before the run otherwise
    /// concluded.
    StoppedBySignal,
}

pub struct RunReport {
    pub outcome: RunOutcome,
    pub reason: ShutdownReason,
    pub state_times: HashMap<String, IndexMapSnapshot>,
}

/// JSON-serializable view of one program's recorded state times, in the
/// order they were reached.
pub type IndexMapSnapshot = indexmap::IndexMap<String, f64>;

/// Runs `config` to completion and returns the final disposition.
pub async fn run(config: Config, clock: Arc<dyn Clock>) -> Result<RunReport, RuntimeError> {
    let bus = EventBus::new();

    let mut programs: IndexMap<ProgramId, Arc<Program>> = IndexMap::new();
    let mut fsms: IndexMap<ProgramId, Arc<ProgramFsm>> = IndexMap::new();
    for (id, spec) in &config.programs {
        let program = Arc::new(Program::new(spec.clone()));
        let fsm = Arc::new(ProgramFsm::new(program.clone(), clock.clone(), bus.clone()));
        programs.insert(id.clone(), program);
        fsms.insert(id.clone(), fsm);
    }
    let programs = Arc::new(programs);
    let fsms = Arc::new(fsms);

    for fsm in fsms.values() {
        fsm.record_initialized();
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let spawn_rx = bus.subscribe();
    let scheduler_rx = bus.subscribe();
    let arbiter_rx = bus.subscribe();

    let supervisor_handles: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

    let spawn_task = tokio::spawn(spawn_on_start(
        programs.clone(),
        fsms.clone(),
        config.programs.clone(),
        spawn_rx,
        stop_rx.clone(),
        supervisor_handles.clone(),
    ));

    let scheduler_task = tokio::spawn(scheduler::run(programs.clone(), bus.clone(), scheduler_rx));

    let arbiter_config = ArbiterConfig {
        stop_signal: config.stop_signal.clone(),
        max_run_time: config.max_run_time,
        success_criteria: config.success_criteria.clone(),
    };
    let shutdown_rx = arbiter::start(arbiter_config, programs.clone(), arbiter_rx);

    let reason = shutdown_rx
        .await
        .map_err(|_| RuntimeError::Io(std::io::Error::other("arbiter task ended without a verdict")))?;

    tracing::info!(?reason, "shutdown triggered");

    for fsm in fsms.values() {
        fsm.stop_requested();
    }
    let _ = stop_tx.send(true);

    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE_PERIOD;
    while programs.values().any(|p| !p.is_final()) {
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("shutdown grace period elapsed with programs still not final");
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    scheduler_task.abort();
    spawn_task.abort();

    // Every supervisor task spawn_on_start handed off must be reaped
    // before the run reports done (§3 invariant 6): the grace-period
    // wait above only watches `Program::is_final()`, which a supervisor
    // task can reach a moment before its own cleanup finishes.
    let handles: Vec<JoinHandle<()>> = {
        let mut guard = supervisor_handles.lock().unwrap();
        std::mem::take(&mut *guard)
    };
    for handle in handles {
        let _ = handle.await;
    }

    let outcome = determine_outcome(reason, &programs);
    let state_times = collect_state_times(&programs);

    Ok(RunReport {
        outcome,
        reason,
        state_times,
    })
}

async fn spawn_on_start(
    programs: Arc<IndexMap<ProgramId, Arc<Program>>>,
    fsms: Arc<IndexMap<ProgramId, Arc<ProgramFsm>>>,
    specs: IndexMap<ProgramId, Arc<shepherd_core::program::ProgramSpec>>,
    mut events: tokio::sync::broadcast::Receiver<Event>,
    stop_rx: watch::Receiver<bool>,
    supervisor_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        match events.recv().await {
            Ok(Event::DepsSatisfied { program }) => {
                let Some(spec) = specs.get(&program) else { continue };
                let Some(fsm) = fsms.get(&program) else { continue };
                if fsm.program().is_final() {
                    // Resolved straight to final (e.g. a stop requested
                    // before this program ever started) while the
                    // Dependency Scheduler was still mid-flight; the
                    // Scheduler itself no longer publishes for a final
                    // program, but this guards against anything already
                    // queued on the bus.
                    continue;
                }
                spawn_watcher(spec.clone(), fsm.clone(), stop_rx.clone());
                let spec = spec.clone();
                let fsm = fsm.clone();
                let stop_rx = stop_rx.clone();
                let handle = tokio::spawn(async move {
                    run_supervisor(spec, fsm, stop_rx, default_signal()).await;
                });
                supervisor_handles.lock().unwrap().push(handle);
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
        if programs.values().all(|p| p.is_final()) {
            return;
        }
    }
}

fn determine_outcome(reason: ShutdownReason, programs: &IndexMap<ProgramId, Arc<Program>>) -> RunOutcome {
    let any_failed = programs.values().any(|p| {
        p.has_reached(&StateName::Builtin(BuiltinState::ActionFailure))
            || p.has_reached(&StateName::Builtin(BuiltinState::ServiceFailure))
    });
    match reason {
        // The criteria being satisfied masks any failure elsewhere in the
        // graph (§4.F step 6) - peers that never reached their target
        // state, or that are still mid-flight when the criteria fires,
        // don't turn a satisfied run into a failure.
        ShutdownReason::SuccessCriteria => RunOutcome::Success,
        // A stop signal or a max-run-time deadline only turns the run
        // into a failure if some program actually ended in a failure
        // classification (§6: "0 ... where all programs reached
        // non-failure terminal states"). Reaching the deadline or being
        // asked to stop is not itself a failure.
        _ if any_failed => RunOutcome::Failure,
        ShutdownReason::StopSignal => RunOutcome::StoppedBySignal,
        ShutdownReason::MaxRunTime => RunOutcome::TimedOut,
        ShutdownReason::AllProgramsFinal => RunOutcome::Success,
    }
}

fn collect_state_times(programs: &IndexMap<ProgramId, Arc<Program>>) -> HashMap<String, IndexMapSnapshot> {
    programs
        .iter()
        .map(|(id, program)| {
            let snapshot = program
                .state_times_snapshot()
                .into_iter()
                .map(|(state, at)| (state.as_str().to_string(), at))
                .collect();
            (id.as_str().to_string(), snapshot)
        })
        .collect()
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
