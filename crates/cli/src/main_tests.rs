use super::Cli;
use clap::Parser;

#[test]
fn config_is_required() {
    let err = Cli::try_parse_from(["shepherd"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
}

#[test]
fn config_alone_parses_with_no_overrides() {
    let cli = Cli::try_parse_from(["shepherd", "--config", "shepherd.yaml"]).unwrap();
    assert_eq!(cli.config.to_str(), Some("shepherd.yaml"));
    assert!(cli.run_dir.is_none());
    assert!(cli.work_dir.is_none());
}

#[test]
fn run_dir_and_work_dir_are_accepted() {
    let cli = Cli::try_parse_from([
        "shepherd",
        "--config",
        "shepherd.yaml",
        "--run-dir",
        "/tmp/run",
        "--work-dir",
        "/tmp/work",
    ])
    .unwrap();
    assert_eq!(cli.run_dir.as_deref(), Some(std::path::Path::new("/tmp/run")));
    assert_eq!(cli.work_dir.as_deref(), Some(std::path::Path::new("/tmp/work")));
}
