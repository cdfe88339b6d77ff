// SPDX-License-Identifier: MIT

//! Serde shape of the YAML configuration document (§6), before lowering
//! and validation. Kept deliberately permissive — defaults and the
//! `tasks`/`services` synonym are resolved here; anything that can only
//! be checked against the whole graph (peer references, cycles) happens
//! in [`crate::validate`].

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub tasks: Option<HashMap<String, RawProgram>>,
    #[serde(default)]
    pub services: Option<HashMap<String, RawProgram>>,
    pub output: RawOutput,
    #[serde(default)]
    pub stop_signal: Option<PathBuf>,
    #[serde(default)]
    pub max_run_time: Option<f64>,
    #[serde(default)]
    pub success_criteria: Option<RawCriteria>,
}

#[derive(Debug, Deserialize)]
pub struct RawOutput {
    pub state_times: PathBuf,
    #[serde(default)]
    pub stdout: Option<PathBuf>,
    #[serde(default)]
    pub stderr: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawKind {
    #[default]
    Action,
    Service,
}

#[derive(Debug, Deserialize)]
pub struct RawProgram {
    #[serde(default, rename = "type")]
    pub kind: RawKind,
    pub command: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    #[serde(default = "default_true")]
    pub monitor_log: bool,
    #[serde(default)]
    pub state: RawState,
    #[serde(default)]
    pub dependency: RawCriteria,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct RawState {
    #[serde(default)]
    pub log: HashMap<String, String>,
    #[serde(default)]
    pub file: Option<RawFileState>,
}

#[derive(Debug, Deserialize)]
pub struct RawFileState {
    pub path: PathBuf,
    #[serde(default)]
    pub states: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCriteria {
    #[serde(default)]
    pub mode: RawMode,
    #[serde(default)]
    pub items: HashMap<String, String>,
}
