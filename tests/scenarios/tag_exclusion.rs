//! Test: tests tagged with an excluded tag are deselected, never failures

use crate::helpers::*;
use ci_matrix::core::{StepError, StepOutcome};

const SINGLE: &str = "matrix: {python-version: [\"3.9\"]}";

#[tokio::test]
async fn test_known_bug_tests_do_not_fail_the_run() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(SINGLE);
    let runner = ScriptedRunner::new().with_tests(vec![
        case("test_parse", &[], true),
        case("test_known_regression", &["bug"], false),
        case("test_slow_io", &["slow"], true),
    ]);
    let selected = runner.selected();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_run_completed(&report, "3.9");
    assert_eq!(*selected.lock().unwrap(), vec!["test_parse", "test_slow_io"]);
    let output = &run(&report, "3.9").result_for("run-tests").unwrap().output;
    assert!(output.contains("1 deselected"));
}

#[tokio::test]
async fn test_untagged_failure_still_fails() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(SINGLE);
    let runner = ScriptedRunner::new().with_tests(vec![
        case("test_known_regression", &["bug"], false),
        case("test_new_regression", &[], false),
    ]);

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_outcome(
        &report,
        "3.9",
        "run-tests",
        &StepOutcome::Failed(StepError::TestExecutionFailure { exit_code: Some(1) }),
    );
}

#[tokio::test]
async fn test_multiple_excluded_tags() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(
        r#"
matrix:
  python-version: ["3.9"]
test:
  exclude_tags: [bug, network]
"#,
    );
    let runner = ScriptedRunner::new().with_tests(vec![
        case("test_download", &["network"], false),
        case("test_known_regression", &["bug"], false),
        case("test_local", &[], true),
    ]);
    let calls = runner.calls();
    let selected = runner.selected();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_run_completed(&report, "3.9");
    assert_eq!(*selected.lock().unwrap(), vec!["test_local"]);
    assert_eq!(
        calls_for(&calls, "3.9")[3].arg_after("-m"),
        Some("not bug and not network")
    );
}

#[tokio::test]
async fn test_no_excluded_tags_runs_everything() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(
        r#"
matrix:
  python-version: ["3.9"]
test:
  exclude_tags: []
"#,
    );
    let runner = ScriptedRunner::new().with_tests(vec![case("test_known_regression", &["bug"], false)]);
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_run_failed_at(&report, "3.9", "run-tests");
    assert_eq!(calls_for(&calls, "3.9")[3].args, vec!["-m", "pytest"]);
}
