use super::*;
use shepherd_core::clock::FakeClock;
use shepherd_core::program::{DependencySpec, ExitDisposition, ProgramKind, ProgramSpec};
use shepherd_core::{EventBus, ProgramFsm};
use std::collections::HashMap;
use std::path::PathBuf;

fn build(name: &str, deps: DependencySpec, bus: &EventBus) -> (Arc<Program>, Arc<ProgramFsm>) {
    let spec = Arc::new(ProgramSpec {
        name: ProgramId::new(name),
        kind: ProgramKind::Action,
        command: "true".into(),
        stdout_path: PathBuf::from(format!("/tmp/{name}.out")),
        stderr_path: PathBuf::from(format!("/tmp/{name}.err")),
        monitor_log: false,
        log_states: HashMap::new(),
        file_states: None,
        deps,
    });
    let program = Arc::new(Program::new(spec));
    let clock = Arc::new(FakeClock::new());
    let fsm = Arc::new(ProgramFsm::new(program.clone(), clock, bus.clone()));
    (program, fsm)
}

async fn next_deps_satisfied(events: &mut broadcast::Receiver<Event>) -> ProgramId {
    loop {
        match events.recv().await.unwrap() {
            Event::DepsSatisfied { program } => return program,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn program_with_no_deps_starts_immediately() {
    let bus = EventBus::new();
    let (program, fsm) = build("a", DependencySpec::default(), &bus);
    fsm.record_initialized();

    let mut programs = IndexMap::new();
    programs.insert(ProgramId::new("a"), program.clone());

    let mut watch = bus.subscribe();
    run(Arc::new(programs), bus.clone(), bus.subscribe()).await;

    assert_eq!(next_deps_satisfied(&mut watch).await, ProgramId::new("a"));
}

#[tokio::test]
async fn all_mode_waits_for_every_item() {
    let bus = EventBus::new();
    let (upstream, upstream_fsm) = build("up", DependencySpec::default(), &bus);
    let deps = DependencySpec {
        mode: DependencyMode::All,
        items: HashMap::from([("up".to_string(), "action_success".to_string())]),
    };
    let (downstream, downstream_fsm) = build("down", deps, &bus);

    let mut programs = IndexMap::new();
    programs.insert(ProgramId::new("up"), upstream.clone());
    programs.insert(ProgramId::new("down"), downstream.clone());

    upstream_fsm.record_initialized();
    downstream_fsm.record_initialized();

    let mut watch = bus.subscribe();
    let programs = Arc::new(programs);
    let handle = tokio::spawn(run(programs.clone(), bus.clone(), bus.subscribe()));

    assert_eq!(next_deps_satisfied(&mut watch).await, ProgramId::new("up"));

    upstream_fsm.deps_satisfied();
    upstream_fsm.exit(ExitDisposition::Exited(0));

    assert_eq!(next_deps_satisfied(&mut watch).await, ProgramId::new("down"));

    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not finish")
        .unwrap();
}

#[tokio::test]
async fn a_dependency_satisfied_after_the_program_is_final_does_not_republish() {
    let bus = EventBus::new();
    let (upstream, upstream_fsm) = build("up", DependencySpec::default(), &bus);
    let deps = DependencySpec {
        mode: DependencyMode::All,
        items: HashMap::from([("up".to_string(), "action_success".to_string())]),
    };
    let (downstream, downstream_fsm) = build("down", deps, &bus);

    let mut programs = IndexMap::new();
    programs.insert(ProgramId::new("up"), upstream.clone());
    programs.insert(ProgramId::new("down"), downstream.clone());

    upstream_fsm.record_initialized();
    downstream_fsm.record_initialized();
    // "down" never started: resolved straight to stopped -> final, the
    // same way a stop requested before deps were ever satisfied does.
    downstream_fsm.stop_requested();
    assert!(downstream.is_final());

    let mut watch = bus.subscribe();
    let programs = Arc::new(programs);
    let handle = tokio::spawn(run(programs.clone(), bus.clone(), bus.subscribe()));

    assert_eq!(next_deps_satisfied(&mut watch).await, ProgramId::new("up"));

    upstream_fsm.deps_satisfied();
    upstream_fsm.exit(ExitDisposition::Exited(0));

    // "up" reaching action_success now satisfies "down"'s predicate, but
    // "down" is already final and must not receive a late DepsSatisfied.
    tokio::time::timeout(std::time::Duration::from_millis(500), handle)
        .await
        .expect("scheduler did not finish")
        .unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(200);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, watch.recv()).await {
            Ok(Ok(Event::DepsSatisfied { program })) => {
                assert_ne!(program, ProgramId::new("down"), "down must not be re-satisfied after going final");
            }
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
}

#[tokio::test]
async fn any_mode_fires_on_first_satisfied_item() {
    let bus = EventBus::new();
    let (a, a_fsm) = build("a", DependencySpec::default(), &bus);
    let (b, b_fsm) = build("b", DependencySpec::default(), &bus);
    let deps = DependencySpec {
        mode: DependencyMode::Any,
        items: HashMap::from([
            ("a".to_string(), "action_success".to_string()),
            ("b".to_string(), "action_success".to_string()),
        ]),
    };
    let (downstream, downstream_fsm) = build("down", deps, &bus);

    let mut programs = IndexMap::new();
    programs.insert(ProgramId::new("a"), a.clone());
    programs.insert(ProgramId::new("b"), b.clone());
    programs.insert(ProgramId::new("down"), downstream.clone());

    a_fsm.record_initialized();
    b_fsm.record_initialized();
    downstream_fsm.record_initialized();

    let mut watch = bus.subscribe();
    let handle = tokio::spawn(run(Arc::new(programs), bus.clone(), bus.subscribe()));

    let mut seen = Vec::new();
    seen.push(next_deps_satisfied(&mut watch).await);
    seen.push(next_deps_satisfied(&mut watch).await);
    assert!(seen.contains(&ProgramId::new("a")));
    assert!(seen.contains(&ProgramId::new("b")));

    a_fsm.deps_satisfied();
    a_fsm.exit(ExitDisposition::Exited(0));

    assert_eq!(next_deps_satisfied(&mut watch).await, ProgramId::new("down"));

    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not finish")
        .unwrap();
}
