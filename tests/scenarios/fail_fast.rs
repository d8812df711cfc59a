//! Test: the first failing step halts its run plan and only that plan

use crate::helpers::*;
use ci_matrix::core::{ExecutionStatus, RunStatus, StepError, StepOutcome};

#[tokio::test]
async fn test_unavailable_pin_stops_before_tests() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("{}");
    let runner = ScriptedRunner::new().failing_on("python3.7/bin/python -m pip install pytest==6.2.2");
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.8", "3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_run_failed_at(&report, "3.7", "install-test-runner");
    assert_attempted(
        &report,
        "3.7",
        &["upgrade-pip", "install-requirements", "install-test-runner"],
    );
    assert_eq!(
        run(&report, "3.7").status,
        RunStatus::Failed {
            step: "install-test-runner".to_string(),
            error: StepError::VersionPinMismatch {
                package: "pytest".to_string(),
                version: "6.2.2".to_string(),
                exit_code: Some(1),
            },
        }
    );

    // Later steps were never attempted
    assert!(calls_for(&calls, "3.7")
        .iter()
        .all(|c| !c.args.contains(&"pytest".to_string()) && !c.args.contains(&".".to_string())));

    // Sibling plans are unaffected
    assert_run_completed(&report, "3.8");
    assert_run_completed(&report, "3.9");
    assert_eq!(report.failed_runs().len(), 1);
}

#[tokio::test]
async fn test_upgrade_failure_is_fatal() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("matrix: {python-version: [\"3.8\"]}");
    let runner = ScriptedRunner::new().failing_on("--upgrade pip");

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.8"]),
        runner,
        memory_store(),
    )
    .await;

    assert_attempted(&report, "3.8", &["upgrade-pip"]);
    assert!(matches!(
        &run(&report, "3.8").status,
        RunStatus::Failed { error: StepError::CommandFailed { exit_code: Some(1), .. }, .. }
    ));
}

#[tokio::test]
async fn test_failing_suite_skips_install_verification() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("matrix: {python-version: [\"3.8\"]}");
    let runner = ScriptedRunner::new().with_tests(vec![
        case("test_ok", &[], true),
        case("test_broken", &[], false),
    ]);

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.8"]),
        runner,
        memory_store(),
    )
    .await;

    assert_run_failed_at(&report, "3.8", "run-tests");
    assert!(run(&report, "3.8").result_for("verify-install").is_none());
    assert_outcome(
        &report,
        "3.8",
        "run-tests",
        &StepOutcome::Failed(StepError::TestExecutionFailure { exit_code: Some(1) }),
    );
    let output = &run(&report, "3.8").result_for("run-tests").unwrap().output;
    assert!(output.contains("1 failed, 1 passed"));
}

#[tokio::test]
async fn test_install_verification_failure() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("matrix: {python-version: [\"3.9\"]}");
    let runner = ScriptedRunner::new().failing_on("pip install .");

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_eq!(run(&report, "3.9").step_results.len(), 5);
    assert_outcome(
        &report,
        "3.9",
        "verify-install",
        &StepOutcome::Failed(StepError::InstallVerificationFailure { exit_code: Some(1) }),
    );
}
