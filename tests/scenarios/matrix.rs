//! Test: matrix expansion and triggers at the workflow level

use crate::helpers::*;
use ci_matrix::core::ExecutionStatus;

#[tokio::test]
async fn test_empty_matrix_runs_nothing_and_succeeds() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("matrix: {python-version: []}");
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&[]),
        runner,
        memory_store(),
    )
    .await;

    assert!(report.runs.is_empty());
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_excluded_combinations_are_not_run() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(
        r#"
matrix:
  python-version: ["3.8", "3.9"]
  extras: [minimal, full]
  exclude:
    - python-version: "3.8"
      extras: full
"#,
    );

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.8", "3.9"]),
        ScriptedRunner::new(),
        memory_store(),
    )
    .await;

    let labels: Vec<String> = report.runs.iter().map(|r| r.plan.label()).collect();
    assert_eq!(
        labels,
        vec![
            "python-version=3.8, extras=minimal",
            "python-version=3.9, extras=minimal",
            "python-version=3.9, extras=full",
        ]
    );
    assert!(report.succeeded());
}

#[tokio::test]
async fn test_other_events_do_not_trigger() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("on: [pull_request]");
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.8", "3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert!(report.runs.is_empty());
    assert!(report.succeeded());
    assert!(calls.lock().unwrap().is_empty());
}
