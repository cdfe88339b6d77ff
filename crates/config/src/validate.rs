// SPDX-License-Identifier: MIT

//! Cross-program validation (§7 "Configuration error" row, §4.D, §4.E):
//! unknown peer/state references, reserved-name collisions, duplicate
//! log paths, and dependency-graph cycle detection.

use indexmap::IndexMap;
use shepherd_core::program::{DependencySpec, ProgramKind, ProgramSpec};
use shepherd_core::state::{is_reserved_name, BuiltinState};
use shepherd_core::ConfigError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Every state name a program could ever produce, for reference checking.
/// Built-ins are narrowed by kind: an action never reaches
/// `service_failure`/`stopped`; a service never reaches
/// `action_success`/`action_failure`.
fn producible_states(spec: &ProgramSpec) -> HashSet<String> {
    let mut states: HashSet<String> = [
        BuiltinState::Initialized.as_str(),
        BuiltinState::Started.as_str(),
        BuiltinState::Final.as_str(),
    ]
    .into_iter()
    .map(String::from)
    .collect();

    match spec.kind {
        ProgramKind::Action => {
            states.insert(BuiltinState::ActionSuccess.as_str().to_string());
            states.insert(BuiltinState::ActionFailure.as_str().to_string());
        }
        ProgramKind::Service => {
            states.insert(BuiltinState::ServiceFailure.as_str().to_string());
            states.insert(BuiltinState::Stopped.as_str().to_string());
        }
    }

    states.extend(spec.log_states.keys().cloned());
    if let Some(file_states) = &spec.file_states {
        states.extend(file_states.patterns.keys().cloned());
    }
    states
}

pub fn validate_programs(
    programs: &IndexMap<String, Arc<ProgramSpec>>,
) -> Result<(), ConfigError> {
    for (name, spec) in programs {
        for state_name in spec.log_states.keys() {
            if is_reserved_name(state_name) {
                return Err(ConfigError::ReservedStateName {
                    program: name.clone(),
                    name: state_name.clone(),
                });
            }
        }
        if let Some(file_states) = &spec.file_states {
            if file_states.patterns.is_empty() {
                return Err(ConfigError::EmptyFileStatePatterns {
                    program: name.clone(),
                });
            }
            for state_name in file_states.patterns.keys() {
                if is_reserved_name(state_name) {
                    return Err(ConfigError::ReservedStateName {
                        program: name.clone(),
                        name: state_name.clone(),
                    });
                }
            }
        }
    }

    check_duplicate_log_paths(programs)?;

    for (name, spec) in programs {
        validate_dependency_items(name, &spec.deps, programs)?;
    }

    check_acyclic(programs)?;

    Ok(())
}

fn check_duplicate_log_paths(
    programs: &IndexMap<String, Arc<ProgramSpec>>,
) -> Result<(), ConfigError> {
    let mut owners: HashMap<String, String> = HashMap::new();
    for (name, spec) in programs {
        for path in [&spec.stdout_path, &spec.stderr_path] {
            let key = path.to_string_lossy().to_string();
            if let Some(first) = owners.get(&key) {
                if first != name {
                    return Err(ConfigError::DuplicateLogPath {
                        path: key,
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
            } else {
                owners.insert(key, name.clone());
            }
        }
    }
    Ok(())
}

fn validate_dependency_items(
    owner: &str,
    deps: &DependencySpec,
    programs: &IndexMap<String, Arc<ProgramSpec>>,
) -> Result<(), ConfigError> {
    for (peer, state) in &deps.items {
        let peer_spec = programs.get(peer).ok_or_else(|| ConfigError::UnknownPeer {
            program: owner.to_string(),
            peer: peer.clone(),
        })?;
        if !producible_states(peer_spec).contains(state) {
            return Err(ConfigError::UnknownPeerState {
                program: owner.to_string(),
                peer: peer.clone(),
                state: state.clone(),
            });
        }
    }
    Ok(())
}

/// Validates `success_criteria`/dependency-style items against the full
/// program set (peer references are program names here, not relative to
/// any one program).
pub fn validate_global_criteria(
    items: &HashMap<String, String>,
    programs: &IndexMap<String, Arc<ProgramSpec>>,
) -> Result<(), ConfigError> {
    for (program, state) in items {
        let spec = programs
            .get(program)
            .ok_or_else(|| ConfigError::UnknownSuccessCriteriaProgram(program.clone()))?;
        if !producible_states(spec).contains(state) {
            return Err(ConfigError::UnknownSuccessCriteriaState {
                program: program.clone(),
                state: state.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Straightforward DFS-based cycle detection over the dependency edges
/// (program -> peer), per the "Arena of programs" design note.
fn check_acyclic(programs: &IndexMap<String, Arc<ProgramSpec>>) -> Result<(), ConfigError> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for start in programs.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        visit(start, programs, &mut marks, &mut path)?;
    }
    Ok(())
}

fn visit<'a>(
    node: &'a str,
    programs: &'a IndexMap<String, Arc<ProgramSpec>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Result<(), ConfigError> {
    match marks.get(node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let mut cycle: Vec<String> = path
                .iter()
                .skip_while(|n| **n != node)
                .map(|s| s.to_string())
                .collect();
            cycle.push(node.to_string());
            return Err(ConfigError::DependencyCycle(cycle.join(" -> ")));
        }
        None => {}
    }

    marks.insert(node, Mark::InProgress);
    path.push(node);

    if let Some(spec) = programs.get(node) {
        for peer in spec.deps.items.keys() {
            if programs.contains_key(peer) {
                visit(peer, programs, marks, path)?;
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
