use super::*;
use shepherd_core::clock::FakeClock;
use shepherd_core::program::{DependencySpec, Program, ProgramId, ProgramKind};
use shepherd_core::state::{BuiltinState, StateName};
use shepherd_core::EventBus;
use tempfile::tempdir;

fn spec(kind: ProgramKind, command: &str, dir: &std::path::Path) -> Arc<ProgramSpec> {
    Arc::new(ProgramSpec {
        name: ProgramId::new("p"),
        kind,
        command: command.into(),
        stdout_path: dir.join("out.log"),
        stderr_path: dir.join("err.log"),
        monitor_log: false,
        log_states: Default::default(),
        file_states: None,
        deps: DependencySpec::default(),
    })
}

fn harness(spec: Arc<ProgramSpec>) -> (Arc<ProgramFsm>, Arc<Program>) {
    let clock = Arc::new(FakeClock::new());
    let bus = EventBus::new();
    let program = Arc::new(Program::new(spec));
    let fsm = Arc::new(ProgramFsm::new(program.clone(), clock, bus));
    (fsm, program)
}

#[tokio::test]
async fn successful_action_reaches_action_success() {
    let dir = tempdir().unwrap();
    let spec = spec(ProgramKind::Action, "exit 0", dir.path());
    let (fsm, program) = harness(spec.clone());

    let (_tx, rx) = watch::channel(false);
    run(spec, fsm, rx, Signal::SIGTERM).await;

    assert_eq!(program.current_state(), StateName::Builtin(BuiltinState::Final));
    assert!(program.has_reached(&StateName::Builtin(BuiltinState::ActionSuccess)));
    assert!(program.has_reached(&StateName::Builtin(BuiltinState::Started)));
}

#[tokio::test]
async fn nonzero_exit_is_action_failure() {
    let dir = tempdir().unwrap();
    let spec = spec(ProgramKind::Action, "exit 7", dir.path());
    let (fsm, program) = harness(spec.clone());

    let (_tx, rx) = watch::channel(false);
    run(spec, fsm, rx, Signal::SIGTERM).await;

    assert!(program.has_reached(&StateName::Builtin(BuiltinState::ActionFailure)));
}

#[tokio::test]
async fn stop_request_signals_the_child() {
    let dir = tempdir().unwrap();
    let spec = spec(ProgramKind::Service, "trap 'exit 0' TERM; sleep 30", dir.path());
    let (fsm, program) = harness(spec.clone());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(run(spec, fsm.clone(), rx, Signal::SIGTERM));

    tokio::time::sleep(Duration::from_millis(200)).await;
    fsm.stop_requested();
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not return after stop")
        .unwrap();

    assert!(program.has_reached(&StateName::Builtin(BuiltinState::Stopped)));
}

#[tokio::test]
async fn ignoring_sigterm_escalates_to_sigkill() {
    let dir = tempdir().unwrap();
    let spec = spec(ProgramKind::Service, "trap '' TERM; sleep 30", dir.path());
    let (fsm, program) = harness(spec.clone());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        run_with_short_grace(spec, fsm, rx, Signal::SIGTERM).await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not return after escalation")
        .unwrap();

    assert!(program.is_final());
}

/// Test-only variant of [`run`] with a short grace period so the
/// SIGKILL-escalation path doesn't cost the real [`GRACE_PERIOD`].
async fn run_with_short_grace(
    spec: Arc<ProgramSpec>,
    fsm: Arc<ProgramFsm>,
    mut stop: watch::Receiver<bool>,
    stop_signal: Signal,
) {
    let stdout = open_append(&spec.stdout_path).unwrap();
    let stderr = open_append(&spec.stderr_path).unwrap();
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&spec.command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .process_group(0);
    let mut child = command.spawn().unwrap();
    let pid = child.id().unwrap();
    fsm.deps_satisfied();
    let pgid = Pid::from_raw(pid as i32);

    let disposition = tokio::select! {
        status = child.wait() => exit_disposition(status),
        _ = stop.changed() => {
            signal_group(pgid, stop_signal);
            match tokio::time::timeout(Duration::from_millis(200), child.wait()).await {
                Ok(status) => exit_disposition(status),
                Err(_) => {
                    signal_group(pgid, Signal::SIGKILL);
                    exit_disposition(child.wait().await)
                }
            }
        }
    };
    fsm.exit(disposition);
}

#[tokio::test]
async fn spawn_failure_reports_spawn_failed() {
    let dir = tempdir().unwrap();
    // "sh" itself always exists, but an unreadable stdout path fails open.
    let mut spec = spec(ProgramKind::Action, "true", dir.path());
    Arc::get_mut(&mut spec).unwrap().stdout_path = dir.path().join("missing-dir").join("out.log");
    let (fsm, program) = harness(spec.clone());

    let (_tx, rx) = watch::channel(false);
    run(spec, fsm, rx, Signal::SIGTERM).await;

    assert!(program.has_reached(&StateName::Builtin(BuiltinState::ActionFailure)));
    assert!(!program.has_reached(&StateName::Builtin(BuiltinState::Started)));
}
