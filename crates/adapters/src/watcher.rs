// SPDX-License-Identifier: MIT

//! Log Tailer (§4.A): line-oriented substring matching over a program's
//! stdout/stderr log files and, optionally, a user-named state file.
//!
//! Grounded in the teacher's `agent::watcher` shape: a `notify`-based file
//! watcher wakes the scan loop promptly, with a periodic poll tick as a
//! backstop for platforms/filesystems where notifications are unreliable
//! (network mounts, some container overlays), and a channel the Graph
//! Controller closes to ask every tailer task to stop.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use shepherd_core::fsm::ProgramFsm;
use shepherd_core::program::ProgramSpec;
use shepherd_core::state::StateName;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How often the scan loop wakes up even without a filesystem
/// notification. Also the existence-poll interval while waiting for a
/// file-based state path to first appear.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Whether a scan target starts reading from the current end of file or
/// from byte zero. stdout/stderr are "tapped as they are written" (§4.A)
/// — a path reused across runs (append mode, §4.B) may already hold
/// output from a previous run, which must not be rescanned. A
/// `file_states` path is explicitly specified to be followed "from the
/// beginning" once it appears.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StartPoint {
    EndOfFile,
    Beginning,
}

/// One (path, patterns) scan target. A program typically has two or three:
/// stdout, stderr (both matched against `log_states`, independently and
/// symmetrically per §4.A), and optionally a `file_states` path.
struct ScanTarget {
    path: PathBuf,
    patterns: HashMap<String, String>,
    start: StartPoint,
}

/// Spawns one tailer task per scan target for `spec`, each delivering
/// `pattern_hit` to `fsm` the first time its pattern matches. Returns
/// immediately; tasks run until `shutdown` fires or every declared state
/// has fired.
///
/// stdout and stderr are scanned by separate tasks but share one `fired`
/// set: a pattern configured in `log_states` is matched against both
/// streams (§4.A, "symmetrically"), but must still only fire once per
/// `(program, state_name)` — whichever stream's line hits it first wins
/// and the other stream stops looking for it.
pub fn spawn(spec: Arc<ProgramSpec>, fsm: Arc<ProgramFsm>, shutdown: watch::Receiver<bool>) {
    let targets = scan_targets(&spec);
    if targets.is_empty() {
        return;
    }
    let fired = Arc::new(Mutex::new(HashSet::new()));
    for target in targets {
        if target.patterns.is_empty() {
            continue;
        }
        let fsm = fsm.clone();
        let shutdown = shutdown.clone();
        let fired = fired.clone();
        tokio::spawn(async move {
            tail(target, fsm, shutdown, fired).await;
        });
    }
}

fn scan_targets(spec: &ProgramSpec) -> Vec<ScanTarget> {
    let mut targets = Vec::new();
    if spec.monitor_log && !spec.log_states.is_empty() {
        targets.push(ScanTarget {
            path: spec.stdout_path.clone(),
            patterns: spec.log_states.clone(),
            start: StartPoint::EndOfFile,
        });
        targets.push(ScanTarget {
            path: spec.stderr_path.clone(),
            patterns: spec.log_states.clone(),
            start: StartPoint::EndOfFile,
        });
    }
    if let Some(file_states) = &spec.file_states {
        targets.push(ScanTarget {
            path: file_states.path.clone(),
            patterns: file_states.patterns.clone(),
            start: StartPoint::Beginning,
        });
    }
    targets
}

async fn tail(target: ScanTarget, fsm: Arc<ProgramFsm>, mut shutdown: watch::Receiver<bool>, fired: Arc<Mutex<HashSet<String>>>) {
    let path = target.path.clone();

    let Some(mut file) = wait_for_file(&path, &mut shutdown).await else {
        // Shut down before the file ever appeared — not an error, just
        // no events fire for this target.
        return;
    };

    let mut offset: u64 = match target.start {
        StartPoint::EndOfFile => file.metadata().map(|m| m.len()).unwrap_or(0),
        StartPoint::Beginning => 0,
    };

    let (_watcher, mut notify_rx) = make_watcher(&path);
    let mut leftover = Vec::new();

    loop {
        match read_new_lines(&mut file, &mut offset, &mut leftover) {
            Ok(lines) => {
                for line in lines {
                    let newly_fired: Vec<String> = {
                        let mut fired = fired.lock().unwrap();
                        let mut newly_fired = Vec::new();
                        for (name, pattern) in target.patterns.iter() {
                            if !fired.contains(name.as_str()) && line.contains(pattern.as_str()) {
                                fired.insert(name.clone());
                                newly_fired.push(name.clone());
                            }
                        }
                        newly_fired
                    };
                    for name in newly_fired {
                        fsm.pattern_hit(StateName::user(name));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "log tailer stream read error");
                return;
            }
        }

        if all_fired(&target, &fired) {
            return;
        }

        tokio::select! {
            _ = shutdown.changed() => {
                // Best-effort final drain of whatever had already landed
                // on disk before returning.
                let _ = read_new_lines(&mut file, &mut offset, &mut leftover);
                return;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            Some(()) = async { notify_rx.as_mut()?.recv().await } => {}
        }
    }
}

fn all_fired(target: &ScanTarget, fired: &Mutex<HashSet<String>>) -> bool {
    let fired = fired.lock().unwrap();
    target.patterns.keys().all(|name| fired.contains(name))
}

/// Polls for `path` to appear, honoring shutdown. Returns `None` if
/// shutdown fires first.
async fn wait_for_file(path: &Path, shutdown: &mut watch::Receiver<bool>) -> Option<File> {
    loop {
        if let Ok(file) = File::open(path) {
            return Some(file);
        }
        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

fn make_watcher(path: &Path) -> (Option<RecommendedWatcher>, Option<mpsc::Receiver<()>>) {
    let (tx, rx) = mpsc::channel(32);
    let watch_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = tx.blocking_send(());
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!(error = %e, "file watcher unavailable, relying on polling");
            return (None, None);
        }
    };
    match watcher.watch(watch_dir, RecursiveMode::NonRecursive) {
        Ok(()) => (Some(watcher), Some(rx)),
        Err(e) => {
            tracing::debug!(error = %e, "failed to watch directory, relying on polling");
            (None, None)
        }
    }
}

/// Reads whatever bytes have been appended since `offset`, splits them
/// into complete `\n`-terminated lines, and carries any trailing partial
/// line forward in `leftover` for the next call.
fn read_new_lines(
    file: &mut File,
    offset: &mut u64,
    leftover: &mut Vec<u8>,
) -> std::io::Result<Vec<String>> {
    let len = file.metadata()?.len();
    if len < *offset {
        // Truncated (e.g. log rotation) — restart from the top.
        *offset = 0;
        leftover.clear();
    }
    if len == *offset {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(*offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    *offset += buf.len() as u64;

    leftover.extend_from_slice(&buf);

    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &b) in leftover.iter().enumerate() {
        if b == b'\n' {
            lines.push(String::from_utf8_lossy(&leftover[start..i]).into_owned());
            start = i + 1;
        }
    }
    leftover.drain(..start);

    Ok(lines)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
