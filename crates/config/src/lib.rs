// SPDX-License-Identifier: MIT

//! shepherd-config: reads and validates the YAML configuration document
//! (§6) into the in-memory program graph `shepherd-core` operates on.

mod lower;
mod raw;
mod validate;

use indexmap::IndexMap;
use raw::RawConfig;
use shepherd_core::program::{DependencyMode, ProgramId, ProgramSpec};
use shepherd_core::ConfigError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Output file destinations (§6 `output.*`).
#[derive(Debug, Clone)]
pub struct Output {
    pub state_times: PathBuf,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

/// `{mode, items: {program -> required_state}}`, used for
/// `success_criteria` (§4.E). Structurally identical to a program's
/// dependency spec but evaluated against the whole graph rather than one
/// program's peers.
#[derive(Debug, Clone)]
pub struct SuccessCriteria {
    pub mode: DependencyMode,
    pub items: HashMap<String, String>,
}

/// The fully validated, in-memory configuration: ready to hand to
/// `shepherd-engine`.
#[derive(Debug, Clone)]
pub struct Config {
    pub programs: IndexMap<ProgramId, Arc<ProgramSpec>>,
    pub output: Output,
    pub stop_signal: Option<PathBuf>,
    pub max_run_time: Option<Duration>,
    pub success_criteria: Option<SuccessCriteria>,
}

/// Parses and validates a configuration file.
///
/// Relative paths inside the document (log paths, `stop_signal`,
/// `output.*`) are resolved against `run_dir`.
pub fn load(config_path: &Path, run_dir: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(config_path)
        .map_err(|e| ConfigError::Invalid(format!("reading {config_path:?}: {e}")))?;
    load_str(&text, run_dir)
}

pub fn load_str(text: &str, run_dir: &Path) -> Result<Config, ConfigError> {
    let raw: RawConfig =
        serde_yaml::from_str(text).map_err(|e| ConfigError::Invalid(format!("parsing YAML: {e}")))?;

    let merged = lower::merge_program_maps(&raw)?;

    let mut programs: IndexMap<String, Arc<ProgramSpec>> = IndexMap::new();
    for (name, raw_program) in &merged {
        programs.insert(name.clone(), lower::lower_program(name, raw_program, run_dir));
    }

    validate::validate_programs(&programs)?;

    if let Some(criteria) = &raw.success_criteria {
        validate::validate_global_criteria(&criteria.items, &programs)?;
    }

    let resolve = |p: &Path| -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            run_dir.join(p)
        }
    };

    let output = Output {
        state_times: resolve(&raw.output.state_times),
        stdout: raw.output.stdout.as_deref().map(&resolve),
        stderr: raw.output.stderr.as_deref().map(&resolve),
    };

    let stop_signal = raw.stop_signal.as_deref().map(&resolve);
    let max_run_time = raw.max_run_time.map(Duration::from_secs_f64);
    let success_criteria = raw.success_criteria.map(|c| SuccessCriteria {
        mode: c.mode.into(),
        items: c.items,
    });

    let programs = programs
        .into_iter()
        .map(|(name, spec)| (ProgramId::new(name), spec))
        .collect();

    Ok(Config {
        programs,
        output,
        stop_signal,
        max_run_time,
        success_criteria,
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
