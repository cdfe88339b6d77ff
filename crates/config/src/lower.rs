// SPDX-License-Identifier: MIT

//! Lowers [`crate::raw`] structures into `shepherd-core` types, resolving
//! relative paths against `run_dir` and merging the `tasks`/`services`
//! synonym. No cross-program validation happens here — see
//! [`crate::validate`].

use crate::raw::{RawConfig, RawFileState, RawKind, RawMode, RawProgram};
use indexmap::IndexMap;
use shepherd_core::program::{DependencyMode, DependencySpec, FileStateSpec, ProgramId, ProgramKind, ProgramSpec};
use shepherd_core::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn resolve(run_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        run_dir.join(path)
    }
}

impl From<RawKind> for ProgramKind {
    fn from(k: RawKind) -> Self {
        match k {
            RawKind::Action => ProgramKind::Action,
            RawKind::Service => ProgramKind::Service,
        }
    }
}

impl From<RawMode> for DependencyMode {
    fn from(m: RawMode) -> Self {
        match m {
            RawMode::All => DependencyMode::All,
            RawMode::Any => DependencyMode::Any,
        }
    }
}

pub fn merge_program_maps(
    raw: &RawConfig,
) -> Result<IndexMap<String, &RawProgram>, ConfigError> {
    let mut merged: IndexMap<String, &RawProgram> = IndexMap::new();
    for (name, program) in raw.tasks.iter().flatten() {
        merged.insert(name.clone(), program);
    }
    for (name, program) in raw.services.iter().flatten() {
        if merged.contains_key(name) {
            return Err(ConfigError::DuplicateProgram(name.clone()));
        }
        merged.insert(name.clone(), program);
    }
    Ok(merged)
}

pub fn lower_program(name: &str, raw: &RawProgram, run_dir: &Path) -> Arc<ProgramSpec> {
    let file_states = raw.state.file.as_ref().map(|f: &RawFileState| FileStateSpec {
        path: resolve(run_dir, &f.path),
        patterns: f.states.clone(),
    });

    Arc::new(ProgramSpec {
        name: ProgramId::new(name),
        kind: raw.kind.into(),
        command: raw.command.clone(),
        stdout_path: resolve(run_dir, &raw.stdout_path),
        stderr_path: resolve(run_dir, &raw.stderr_path),
        monitor_log: raw.monitor_log,
        log_states: raw.state.log.clone(),
        file_states,
        deps: DependencySpec {
            mode: raw.dependency.mode.into(),
            items: raw.dependency.items.clone(),
        },
    })
}
