// SPDX-License-Identifier: MIT

//! The managed program record (§3 of the design): static configuration
//! plus the mutable state fields owned exclusively by [`crate::fsm::ProgramFsm`].

use crate::state::StateName;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

crate::define_id! {
    /// Unique program name within a graph. Doubles as the arena lookup key.
    pub struct ProgramId;
}

/// Whether a program is expected to exit (`action`) or to run until told
/// to stop (`service`). Default is `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    Action,
    Service,
}

impl Default for ProgramKind {
    fn default() -> Self {
        ProgramKind::Action
    }
}

/// How a dependency predicate's peer/state pairs combine. Default `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMode {
    All,
    Any,
}

impl Default for DependencyMode {
    fn default() -> Self {
        DependencyMode::All
    }
}

/// `{mode, items: {peer_name -> required_state}}`. An empty `items` map
/// means the program has no declared dependencies and is eligible at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub mode: DependencyMode,
    #[serde(default)]
    pub items: HashMap<String, String>,
}

impl DependencySpec {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// File-based state extraction: patterns matched against appended content
/// of `path`. Rejected at load if `patterns` is empty (§9 open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStateSpec {
    pub path: PathBuf,
    pub patterns: HashMap<String, String>,
}

/// Final disposition of a child process, as reported by the Process
/// Supervisor to the Program FSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Exited normally with the given status code.
    Exited(i32),
    /// Killed by a signal (signal number).
    Signaled(i32),
    /// The command could not be spawned at all (ENOENT, EACCES, ...).
    SpawnFailed(String),
}

impl ExitDisposition {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitDisposition::Exited(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitDisposition::Exited(0))
    }
}

/// Immutable program configuration, produced by `shepherd-config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub name: ProgramId,
    #[serde(default)]
    pub kind: ProgramKind,
    pub command: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    #[serde(default = "default_true")]
    pub monitor_log: bool,
    #[serde(default)]
    pub log_states: HashMap<String, String>,
    #[serde(default)]
    pub file_states: Option<FileStateSpec>,
    #[serde(default)]
    pub deps: DependencySpec,
}

fn default_true() -> bool {
    true
}

/// Mutable fields owned exclusively by the Program FSM. Readers (the
/// Dependency Scheduler, the Arbiter, artifact serialization) see
/// consistent snapshots taken under the lock but never mutate it.
#[derive(Debug)]
pub struct ProgramRuntime {
    pub current: StateName,
    pub state_times: IndexMap<StateName, f64>,
    /// Set once a graceful stop has been requested, used to distinguish
    /// `stopped` from `service_failure` on exit.
    pub stop_requested: bool,
}

impl Default for ProgramRuntime {
    fn default() -> Self {
        Self {
            current: StateName::Builtin(crate::state::BuiltinState::Initialized),
            state_times: IndexMap::new(),
            stop_requested: false,
        }
    }
}

/// A managed program: static spec plus the FSM's mutable state, shared via
/// `Arc` between the Graph Controller, Scheduler, Arbiter, and adapters.
#[derive(Debug)]
pub struct Program {
    pub spec: Arc<ProgramSpec>,
    pub(crate) runtime: RwLock<ProgramRuntime>,
}

impl Program {
    pub fn new(spec: Arc<ProgramSpec>) -> Self {
        Self {
            spec,
            runtime: RwLock::new(ProgramRuntime::default()),
        }
    }

    pub fn name(&self) -> &ProgramId {
        &self.spec.name
    }

    /// Snapshot of the current state name.
    pub fn current_state(&self) -> StateName {
        self.runtime.read().current.clone()
    }

    pub fn is_final(&self) -> bool {
        self.runtime.read().current.is_final()
    }

    /// Whether `state` has been reached or passed (a watermark check, per
    /// the dependency semantics in §4.D): true once it appears in
    /// `state_times`, regardless of the program's current state.
    pub fn has_reached(&self, state: &StateName) -> bool {
        self.runtime.read().state_times.contains_key(state)
    }

    pub fn time_of(&self, state: &StateName) -> Option<f64> {
        self.runtime.read().state_times.get(state).copied()
    }

    /// Ordered snapshot of every state entered so far, for the final
    /// artifact and for scheduler/arbiter predicate evaluation.
    pub fn state_times_snapshot(&self) -> IndexMap<StateName, f64> {
        self.runtime.read().state_times.clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.runtime.read().stop_requested
    }
}
