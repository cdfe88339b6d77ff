use super::*;
use shepherd_core::clock::FakeClock;
use shepherd_core::program::{DependencySpec, FileStateSpec, Program, ProgramId, ProgramKind};
use shepherd_core::{EventBus, ProgramFsm};
use std::io::Write;
use std::time::Duration as StdDuration;
use tempfile::tempdir;

fn spec(kind: ProgramKind, log_states: HashMap<String, String>, stdout: PathBuf, stderr: PathBuf) -> Arc<ProgramSpec> {
    Arc::new(ProgramSpec {
        name: ProgramId::new("p"),
        kind,
        command: "true".into(),
        stdout_path: stdout,
        stderr_path: stderr,
        monitor_log: true,
        log_states,
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

#[tokio::test(flavor = "multi_thread")]
async fn pattern_match_fires_once_for_repeated_lines() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    std::fs::write(&out, "").unwrap();
    std::fs::write(&err, "").unwrap();

    let log_states = HashMap::from([("ready".to_string(), "server is ready".to_string())]);
    let spec = spec(ProgramKind::Service, log_states, out.clone(), err);
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (_tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    let mut file = std::fs::File::create(&out).unwrap();
    writeln!(file, "booting").unwrap();
    writeln!(file, "server is ready to go").unwrap();
    writeln!(file, "server is ready to go again").unwrap();
    drop(file);

    wait_until(StdDuration::from_secs(2), || {
        program.current_state() == StateName::user("ready")
    })
    .await;

    assert_eq!(program.current_state(), StateName::user("ready"));
    assert_eq!(
        program
            .state_times_snapshot()
            .keys()
            .filter(|s| **s == StateName::user("ready"))
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stdout_and_stderr_are_scanned_independently() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    std::fs::write(&out, "").unwrap();
    std::fs::write(&err, "").unwrap();

    let log_states = HashMap::from([("warned".to_string(), "WARNING".to_string())]);
    let spec = spec(ProgramKind::Action, log_states, out, err.clone());
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (_tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    let mut file = std::fs::File::create(&err).unwrap();
    writeln!(file, "WARNING: disk almost full").unwrap();
    drop(file);

    wait_until(StdDuration::from_secs(2), || {
        program.current_state() == StateName::user("warned")
    })
    .await;

    assert_eq!(program.current_state(), StateName::user("warned"));
}

#[tokio::test(flavor = "multi_thread")]
async fn same_pattern_on_stdout_and_stderr_fires_only_once() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    std::fs::write(&out, "").unwrap();
    std::fs::write(&err, "").unwrap();

    let log_states = HashMap::from([("ready".to_string(), "server is ready".to_string())]);
    let spec = spec(ProgramKind::Service, log_states, out.clone(), err.clone());
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (_tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    let mut out_file = std::fs::File::create(&out).unwrap();
    writeln!(out_file, "server is ready").unwrap();
    drop(out_file);
    let mut err_file = std::fs::File::create(&err).unwrap();
    writeln!(err_file, "server is ready").unwrap();
    drop(err_file);

    wait_until(StdDuration::from_secs(2), || {
        program.current_state() == StateName::user("ready")
    })
    .await;

    // Give the slower stream's tailer a chance to have also scanned its
    // (matching) line before asserting it didn't fire a second time.
    tokio::time::sleep(StdDuration::from_millis(200)).await;

    assert_eq!(program.current_state(), StateName::user("ready"));
    assert_eq!(
        program
            .state_times_snapshot()
            .keys()
            .filter(|s| **s == StateName::user("ready"))
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_content_from_a_previous_run_is_not_replayed() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    // Simulates a stdout path reused across runs (append mode, §4.B):
    // the pattern is already present before this run's tailer starts.
    std::fs::write(&out, "server is ready\n").unwrap();
    std::fs::write(&err, "").unwrap();

    let log_states = HashMap::from([("ready".to_string(), "server is ready".to_string())]);
    let spec = spec(ProgramKind::Service, log_states, out.clone(), err);
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (_tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert_eq!(program.current_state(), StateName::Builtin(shepherd_core::state::BuiltinState::Started));

    let mut file = std::fs::OpenOptions::new().append(true).open(&out).unwrap();
    writeln!(file, "server is ready").unwrap();
    drop(file);

    wait_until(StdDuration::from_secs(2), || {
        program.current_state() == StateName::user("ready")
    })
    .await;
    assert_eq!(program.current_state(), StateName::user("ready"));
}

#[tokio::test(flavor = "multi_thread")]
async fn file_state_target_uses_its_own_patterns() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    let state_path = dir.path().join("state.txt");
    std::fs::write(&out, "").unwrap();
    std::fs::write(&err, "").unwrap();

    let mut spec = spec(ProgramKind::Action, HashMap::new(), out, err);
    Arc::get_mut(&mut spec).unwrap().file_states = Some(FileStateSpec {
        path: state_path.clone(),
        patterns: HashMap::from([("done".to_string(), "COMPLETE".to_string())]),
    });
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (_tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let mut file = std::fs::File::create(&state_path).unwrap();
    writeln!(file, "job COMPLETE").unwrap();
    drop(file);

    wait_until(StdDuration::from_secs(2), || {
        program.current_state() == StateName::user("done")
    })
    .await;

    assert_eq!(program.current_state(), StateName::user("done"));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_tailer_without_panicking() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stdout.log");
    let err = dir.path().join("stderr.log");
    std::fs::write(&out, "").unwrap();
    std::fs::write(&err, "").unwrap();

    let log_states = HashMap::from([("ready".to_string(), "ready".to_string())]);
    let spec = spec(ProgramKind::Action, log_states, out, err);
    let (fsm, program) = harness(spec);
    fsm.deps_satisfied();

    let (tx, rx) = watch::channel(false);
    super::spawn(program.spec.clone(), fsm.clone(), rx);

    tx.send(true).unwrap();
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert_eq!(program.current_state(), StateName::Builtin(shepherd_core::state::BuiltinState::Started));
}

async fn wait_until(timeout: StdDuration, mut pred: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !pred() {
        if start.elapsed() > timeout {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
}
