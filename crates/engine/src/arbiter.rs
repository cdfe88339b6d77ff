// SPDX-License-Identifier: MIT

//! Terminal-Condition Arbiter (§4.E): watches for any of the run's three
//! stop triggers — a stop-signal file appearing, `max_run_time` elapsing,
//! or `success_criteria` becoming satisfied — plus the degenerate "every
//! program reached final on its own" case, and reports whichever fires
//! first. First-trigger-wins: once one fires, the others are abandoned.
//!
//! Grounded in the teacher's `engine::monitor` polling shape and
//! `adapters::agent::watcher`'s notify-with-poll-fallback pattern, reused
//! here for a single boolean "has this path appeared" signal instead of
//! incremental log parsing.

use indexmap::IndexMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use shepherd_config::SuccessCriteria;
use shepherd_core::event::Event;
use shepherd_core::program::{DependencyMode, Program, ProgramId};
use shepherd_core::state::StateName;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Why the Graph Controller should begin shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    StopSignal,
    MaxRunTime,
    SuccessCriteria,
    AllProgramsFinal,
}

pub struct ArbiterConfig {
    pub stop_signal: Option<PathBuf>,
    pub max_run_time: Option<Duration>,
    pub success_criteria: Option<SuccessCriteria>,
}

/// Spawns the arbiter and returns a receiver that resolves exactly once,
/// with whichever condition triggered first.
pub fn start(
    config: ArbiterConfig,
    programs: Arc<IndexMap<ProgramId, Arc<Program>>>,
    events: broadcast::Receiver<Event>,
) -> oneshot::Receiver<ShutdownReason> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(run(config, programs, events, tx));
    rx
}

async fn run(
    config: ArbiterConfig,
    programs: Arc<IndexMap<ProgramId, Arc<Program>>>,
    mut events: broadcast::Receiver<Event>,
    tx: oneshot::Sender<ShutdownReason>,
) {
    if all_final(&programs) {
        let _ = tx.send(ShutdownReason::AllProgramsFinal);
        return;
    }
    if satisfies(&config.success_criteria, &programs) {
        let _ = tx.send(ShutdownReason::SuccessCriteria);
        return;
    }

    let mut stop_file_rx = config
        .stop_signal
        .as_ref()
        .map(|path| watch_for_path(path.clone()));

    let max_run_time = config.max_run_time;
    let deadline_sleep = async {
        match max_run_time {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline_sleep);

    loop {
        tokio::select! {
            Some(()) = async {
                match stop_file_rx {
                    Some(ref mut rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                let _ = tx.send(ShutdownReason::StopSignal);
                return;
            }
            () = &mut deadline_sleep => {
                let _ = tx.send(ShutdownReason::MaxRunTime);
                return;
            }
            event = events.recv() => {
                match event {
                    Ok(Event::StateChanged { .. }) => {
                        if satisfies(&config.success_criteria, &programs) {
                            let _ = tx.send(ShutdownReason::SuccessCriteria);
                            return;
                        }
                        if all_final(&programs) {
                            let _ = tx.send(ShutdownReason::AllProgramsFinal);
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if satisfies(&config.success_criteria, &programs) {
                            let _ = tx.send(ShutdownReason::SuccessCriteria);
                            return;
                        }
                        if all_final(&programs) {
                            let _ = tx.send(ShutdownReason::AllProgramsFinal);
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

fn all_final(programs: &IndexMap<ProgramId, Arc<Program>>) -> bool {
    !programs.is_empty() && programs.values().all(|p| p.is_final())
}

fn satisfies(criteria: &Option<SuccessCriteria>, programs: &IndexMap<ProgramId, Arc<Program>>) -> bool {
    let Some(criteria) = criteria else { return false };
    let reached = |peer_name: &str, state_name: &str| -> bool {
        programs
            .get(peer_name)
            .is_some_and(|p| p.has_reached(&StateName::from(state_name)))
    };
    if criteria.items.is_empty() {
        return false;
    }
    match criteria.mode {
        DependencyMode::All => criteria.items.iter().all(|(p, s)| reached(p, s)),
        DependencyMode::Any => criteria.items.iter().any(|(p, s)| reached(p, s)),
    }
}

/// Polls for `path` to appear on disk, backed by a `notify` watch on its
/// parent directory for prompt delivery. Sends once and keeps sending on
/// every subsequent wakeup (the caller only reads the first).
fn watch_for_path(path: PathBuf) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if path.exists() {
            let _ = tx.send(()).await;
            return;
        }

        let (notify_tx, mut notify_rx) = mpsc::channel(32);
        let watch_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = notify_tx.blocking_send(());
            }
        });
        let _watcher: Option<RecommendedWatcher> = match watcher {
            Ok(mut w) => match w.watch(&watch_dir, RecursiveMode::NonRecursive) {
                Ok(()) => Some(w),
                Err(_) => None,
            },
            Err(_) => None,
        };

        loop {
            if path.exists() {
                let _ = tx.send(()).await;
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = notify_rx.recv() => {}
            }
        }
    });
    rx
}

#[cfg(test)]
#[path = "arbiter_tests.rs"]
mod tests;
