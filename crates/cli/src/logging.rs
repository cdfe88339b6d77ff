// SPDX-License-Identifier: MIT

//! Logging setup (§10.1): env-filtered `tracing` output to stderr, plus
//! an optional file layer when the config names `output.stdout`/
//! `output.stderr`.
//!
//! Grounded in the teacher daemon's `setup_logging`, narrowed to a
//! single non-blocking file writer (Shepherd runs once and exits; there
//! is no rotation or startup-marker handling to do).

use anyhow::{Context, Result};
use shepherd_config::Output;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Holds the background flush thread alive for the process lifetime.
/// Dropping it flushes and stops non-blocking file writes.
pub fn init(output: &Output) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr));

    let Some(log_path) = output.stdout.as_ref().or(output.stderr.as_ref()) else {
        registry.init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating log directory {parent:?}"))?;
    }
    let dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = log_path.file_name().context("output log path has no file name")?;
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    registry.with(fmt::layer().with_writer(non_blocking).with_ansi(false)).init();
    Ok(Some(guard))
}
