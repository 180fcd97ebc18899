//! CLI tests for the external bisection flow.
//!
//! Spawns the bisector binary the way an operator would, with the test body
//! standing in for the workload between invocations, and verifies exit codes
//! and persisted-state effects.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use bisector::exit_codes;
use bisector::io::overrides::{self, Overrides};
use bisector::io::store::StateStore;
use bisector::session::BisectSession;
use bisector::test_support::{BrokenPipeline, demo_config};

const CONFIG: &str = r#"
[[backend]]
name = "baseline"

[[backend]]
name = "optimizer"
subsystems = ["rewrite_passes", "lowerings"]
"#;

fn bisector(dir: &Path, args: &[&str]) -> Output {
    // Ambient overrides would change the spawned process's hook behavior;
    // the flow under test relies on their absence.
    Command::new(env!("CARGO_BIN_EXE_bisector"))
        .current_dir(dir)
        .env_remove(overrides::BACKEND_VAR)
        .env_remove(overrides::SUBSYSTEM_VAR)
        .env_remove(overrides::MAX_VAR)
        .args(args)
        .output()
        .expect("run bisector")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// One workload run in the test process, the way a separate invocation of the
/// instrumented program would see the persisted search.
fn run_workload(dir: &Path, pipeline: &BrokenPipeline) -> bool {
    let store = StateStore::new(dir.join(".bisector"));
    let session = BisectSession::with_overrides(store, demo_config(), Overrides::default())
        .expect("workload session");
    pipeline.probe(&session)
}

#[test]
fn external_search_converges_on_the_culprit_call() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();
    fs::write(dir.join("bisector.toml"), CONFIG).expect("write config");

    let output = bisector(dir, &["start"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("Started bisection with backend: baseline"));
    assert!(dir.join(".bisector/cursor.json").exists());

    // Alternate workload runs and verdict reports until the CLI announces a
    // conclusion. Culprit: call 2 of 5 in optimizer/lowerings.
    let pipeline = BrokenPipeline::new("optimizer", "lowerings", 5, 2);
    let mut conclusion = None;
    for _ in 0..16 {
        let verdict = if run_workload(dir, &pipeline) {
            "good"
        } else {
            "bad"
        };
        let output = bisector(dir, &[verdict]);
        assert_eq!(output.status.code(), Some(exit_codes::OK));
        let text = stdout(&output);
        if text.contains("Bisection complete") {
            conclusion = Some(text);
            break;
        }
    }

    let conclusion = conclusion.expect("search should conclude");
    assert!(
        conclusion.contains("Bisection complete: optimizer/lowerings call 2 is responsible."),
        "unexpected conclusion: {conclusion}"
    );
    // The verdict process never ran the workload, so it has no cached
    // diagnostic to print.
    assert!(!conclusion.contains("Debug info"));

    let output = bisector(dir, &["end"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("Bisection state deleted."));
    assert!(!dir.join(".bisector").exists());
}

#[test]
fn verdict_before_start_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("bisector.toml"), CONFIG).expect("write config");

    let output = bisector(temp.path(), &["good"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bisector start"), "stderr: {stderr}");
}

#[test]
fn start_without_a_config_file_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = bisector(temp.path(), &["start"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
    assert!(!temp.path().join(".bisector").exists());
}

#[test]
fn end_without_state_reports_and_exits_clean() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = bisector(temp.path(), &["end"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("No bisection state found."));
}
