// SPDX-License-Identifier: MIT

//! Process Supervisor (§4.B): spawns a program's command, redirects its
//! stdout/stderr into the configured log files, and reports the final
//! exit disposition to the Program FSM.
//!
//! Each child is put in its own process group so a graceful stop can
//! signal the whole group rather than just the immediate child —
//! grounded in the teacher's `daemon_process` SIGTERM-then-poll-then-SIGKILL
//! shutdown sequence, generalized from PID-file polling to a direct
//! `tokio::process::Child` handle. The workspace forbids `unsafe_code`
//! (matching the teacher), so the group is created with the safe
//! `process_group(0)` builder rather than a `setsid()` `pre_exec` hook.
//!
//! Calls `fsm.deps_satisfied()` itself, once `spawn()` actually succeeds,
//! rather than relying on the Dependency Scheduler to have done it: §4.B
//! requires a spawn failure to transition `initialized -> {action,
//! service}_failure` directly, skipping `started` entirely, which only
//! this module can guarantee.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use shepherd_core::fsm::ProgramFsm;
use shepherd_core::program::{ExitDisposition, ProgramSpec};
use std::fs::OpenOptions;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

/// How long a stopped program is given to exit after SIGTERM before the
/// supervisor escalates to SIGKILL.
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Spawns `spec.command` and drives it to completion, reporting the
/// result to `fsm.exit(...)`. `stop` is watched for a stop request; when
/// it fires the child's process group is signaled per `stop_signal`
/// (defaulting to SIGTERM) and, if it hasn't exited within
/// [`GRACE_PERIOD`], SIGKILL follows.
///
/// `fsm` must still be `initialized` when this is called — the caller is
/// expected to invoke this only after its own dependency trigger fires,
/// without having called `deps_satisfied` itself.
pub async fn run(spec: Arc<ProgramSpec>, fsm: Arc<ProgramFsm>, mut stop: watch::Receiver<bool>, stop_signal: Signal) {
    let stdout = match open_append(&spec.stdout_path) {
        Ok(f) => f,
        Err(source) => {
            tracing::warn!(program = %spec.name, path = %spec.stdout_path.display(), error = %source, "failed to open stdout log");
            fsm.exit(ExitDisposition::SpawnFailed(source.to_string()));
            return;
        }
    };
    let stderr = match open_append(&spec.stderr_path) {
        Ok(f) => f,
        Err(source) => {
            tracing::warn!(program = %spec.name, path = %spec.stderr_path.display(), error = %source, "failed to open stderr log");
            fsm.exit(ExitDisposition::SpawnFailed(source.to_string()));
            return;
        }
    };

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&spec.command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .process_group(0);

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(program = %spec.name, command = %spec.command, error = %e, "failed to spawn");
            fsm.exit(ExitDisposition::SpawnFailed(e.to_string()));
            return;
        }
    };

    let Some(pid) = child.id() else {
        fsm.exit(ExitDisposition::SpawnFailed("child exited before a pid was observed".into()));
        return;
    };
    fsm.deps_satisfied();
    let pgid = Pid::from_raw(pid as i32);

    let disposition = tokio::select! {
        status = child.wait() => {
            exit_disposition(status)
        }
        _ = stop.changed() => {
            signal_group(pgid, stop_signal);
            graceful_wait(&mut child, pgid).await
        }
    };

    tracing::info!(program = %spec.name, ?disposition, "program exited");
    fsm.exit(disposition);
}

async fn graceful_wait(child: &mut tokio::process::Child, pgid: Pid) -> ExitDisposition {
    match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
        Ok(status) => exit_disposition(status),
        Err(_) => {
            tracing::warn!(pid = pgid.as_raw(), "grace period elapsed, sending SIGKILL");
            signal_group(pgid, Signal::SIGKILL);
            match child.wait().await {
                Ok(status) => exit_disposition(Ok(status)),
                Err(e) => ExitDisposition::SpawnFailed(format!("wait after SIGKILL failed: {e}")),
            }
        }
    }
}

fn signal_group(pgid: Pid, sig: Signal) {
    // Negative pid signals the whole process group.
    let target = Pid::from_raw(-pgid.as_raw());
    if let Err(e) = signal::kill(target, sig) {
        tracing::debug!(pid = pgid.as_raw(), signal = ?sig, error = %e, "failed to signal process group");
    }
}

fn exit_disposition(status: std::io::Result<std::process::ExitStatus>) -> ExitDisposition {
    match status {
        Ok(status) => {
            if let Some(code) = status.code() {
                ExitDisposition::Exited(code)
            } else if let Some(signal) = status.signal() {
                ExitDisposition::Signaled(signal)
            } else {
                ExitDisposition::SpawnFailed("process exited with neither a code nor a signal".into())
            }
        }
        Err(e) => ExitDisposition::SpawnFailed(format!("wait failed: {e}")),
    }
}

fn open_append(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
