// SPDX-License-Identifier: MIT

//! shepherd - local workflow manager
//!
//! Reads a YAML program graph, runs it to a terminal condition, and
//! writes the final state-times artifact. No daemon, no subcommands:
//! one invocation is one run.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use shepherd_core::{RuntimeError, SystemClock};
use shepherd_engine::RunOutcome;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shepherd", version, about = "Run a local program graph to completion")]
struct Cli {
    /// Path to the YAML configuration document
    #[arg(long)]
    config: PathBuf,

    /// Base directory relative config paths are resolved against.
    /// Defaults to the config file's parent directory.
    #[arg(long)]
    run_dir: Option<PathBuf>,

    /// Working directory for spawned children. Defaults to the current
    /// directory.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let run_dir = cli
        .run_dir
        .clone()
        .or_else(|| cli.config.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let config = shepherd_config::load(&cli.config, &run_dir).with_context(|| format!("loading {:?}", cli.config))?;

    let _log_guard = logging::init(&config.output)?;

    if let Some(work_dir) = &cli.work_dir {
        std::env::set_current_dir(work_dir).with_context(|| format!("changing to work dir {work_dir:?}"))?;
    }

    info!(programs = config.programs.len(), "starting run");

    let state_times_path = config.output.state_times.clone();

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    let report = runtime.block_on(shepherd_engine::run(config, Arc::new(SystemClock::new())))?;

    info!(outcome = ?report.outcome, reason = ?report.reason, "run finished");

    write_state_times(&state_times_path, &report.state_times)?;

    // Exit code follows §6: 0 unless a program actually ended in a
    // failure classification. A stop signal or a max-run-time deadline
    // that catches every program in a non-failure terminal state is a
    // clean exit, not a failure.
    std::process::exit(match report.outcome {
        RunOutcome::Failure => 1,
        RunOutcome::Success | RunOutcome::TimedOut | RunOutcome::StoppedBySignal => 0,
    });
}

fn write_state_times(
    path: &Path,
    state_times: &std::collections::HashMap<String, indexmap::IndexMap<String, f64>>,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(state_times).context("serializing state-times artifact")?;
    std::fs::write(path, json).map_err(|source| RuntimeError::ArtifactWrite {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
