//! Test: every run plan completes against its own interpreter

use crate::helpers::*;
use ci_matrix::core::{
    ExecutionStatus, StepOutcome, CI_VAR, PIP_CACHE_DIR_VAR, SKIP_NATIVE_BUILD_VAR,
    STANDARD_STEP_NAMES,
};
use std::collections::HashSet;

#[tokio::test]
async fn test_reference_workflow_completes_for_every_version() {
    let sandbox = Sandbox::with_requirements("six==1.16.0\n");
    let workflow = sandbox.workflow("{}");
    let runner = ScriptedRunner::new().with_tests(vec![case("test_import", &[], true)]);
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.8", "3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.runs.len(), 3);
    for version in ["3.7", "3.8", "3.9"] {
        assert_run_completed(&report, version);
        assert_attempted(&report, version, &STANDARD_STEP_NAMES);

        // All five commands ran against this plan's interpreter and nothing else
        let own = calls_for(&calls, version);
        assert_eq!(own.len(), 5);
        assert_eq!(own[0].args, vec!["-m", "pip", "install", "--upgrade", "pip"]);
        assert_eq!(own[1].args, vec!["-m", "pip", "install", "-r", "requirements.txt"]);
        assert_eq!(own[2].args, vec!["-m", "pip", "install", "pytest==6.2.2"]);
        assert_eq!(own[3].args, vec!["-m", "pytest", "-m", "not bug"]);
        assert_eq!(own[4].args, vec!["-m", "pip", "install", "."]);
    }
    assert_eq!(calls.lock().unwrap().len(), 15);
}

#[tokio::test]
async fn test_steps_see_ci_environment_and_private_cache_dirs() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow("{}");
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.8", "3.9"]),
        runner,
        memory_store(),
    )
    .await;

    let calls = calls.lock().unwrap();
    for call in calls.iter() {
        assert_eq!(call.env.get(SKIP_NATIVE_BUILD_VAR).map(String::as_str), Some("1"));
        assert_eq!(call.env.get(CI_VAR).map(String::as_str), Some("true"));
        assert_ne!(call.cwd, sandbox.workdir.path());
    }

    let cache_dirs: HashSet<&String> = calls
        .iter()
        .filter_map(|c| c.env.get(PIP_CACHE_DIR_VAR))
        .collect();
    assert_eq!(cache_dirs.len(), 3);
}

#[tokio::test]
async fn test_each_plan_builds_in_its_own_copy_of_the_package() {
    let sandbox = Sandbox::with_requirements("six\n");
    std::fs::write(sandbox.workdir.path().join("setup.py"), "setup()\n").unwrap();
    let workflow = sandbox.workflow("{}");
    let runner = ScriptedRunner::new();
    let calls = runner.calls();
    let stale_builds = runner.stale_builds();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.8", "3.9"]),
        runner,
        memory_store(),
    )
    .await;
    assert!(report.succeeded());

    let mut roots = HashSet::new();
    for version in ["3.7", "3.8", "3.9"] {
        let own: HashSet<_> = calls_for(&calls, version).into_iter().map(|c| c.cwd).collect();
        assert_eq!(own.len(), 1, "run {} should use one working directory", version);
        roots.extend(own);
    }
    assert_eq!(roots.len(), 3);

    // No build ever saw another plan's output, and the caller's tree stays clean
    assert!(stale_builds.lock().unwrap().is_empty());
    assert!(!sandbox.workdir.path().join("build").exists());
    // Copies are removed once their run finishes
    assert!(roots.iter().all(|root| !root.exists()));
}

#[tokio::test]
async fn test_extra_step_runs_before_tests() {
    let sandbox = Sandbox::with_requirements("six\n");
    let workflow = sandbox.workflow(
        r#"
matrix:
  python-version: ["3.9"]
steps:
  - name: lint
    run: [python, -m, flake8, --count]
"#,
    );
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert_attempted(
        &report,
        "3.9",
        &[
            "upgrade-pip",
            "install-requirements",
            "install-test-runner",
            "lint",
            "run-tests",
            "verify-install",
        ],
    );
    assert_outcome(&report, "3.9", "lint", &StepOutcome::Succeeded);
    let own = calls_for(&calls, "3.9");
    assert_eq!(own[3].args, vec!["-m", "flake8", "--count"]);
}
