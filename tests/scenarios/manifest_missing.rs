//! Test: an absent requirements manifest is a skip, not a failure

use crate::helpers::*;
use ci_matrix::core::{SkipReason, StepOutcome, STANDARD_STEP_NAMES};

#[tokio::test]
async fn test_missing_manifest_skips_install() {
    let sandbox = Sandbox::new();
    let workflow = sandbox.workflow("matrix: {python-version: [\"3.7\", \"3.9\"]}");
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.7", "3.9"]),
        runner,
        memory_store(),
    )
    .await;

    assert!(report.succeeded());
    for version in ["3.7", "3.9"] {
        assert_attempted(&report, version, &STANDARD_STEP_NAMES);
        assert_outcome(
            &report,
            version,
            "install-requirements",
            &StepOutcome::Skipped(SkipReason::ManifestMissing {
                path: "requirements.txt".to_string(),
            }),
        );
        assert_eq!(calls_for(&calls, version).len(), 4);
    }
    assert!(calls
        .lock()
        .unwrap()
        .iter()
        .all(|c| !c.args.contains(&"-r".to_string())));
}

#[tokio::test]
async fn test_custom_manifest_name() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.workdir.path().join("requirements-dev.txt"), "pytest-cov\n").unwrap();
    let workflow = sandbox.workflow(
        r#"
matrix:
  python-version: ["3.8"]
cache:
  manifest: requirements-dev.txt
"#,
    );
    let runner = ScriptedRunner::new();
    let calls = runner.calls();

    let (report, _) = run_workflow(
        &sandbox,
        &workflow,
        MockProvisioner::with_versions(&["3.8"]),
        runner,
        memory_store(),
    )
    .await;

    assert_outcome(&report, "3.8", "install-requirements", &StepOutcome::Succeeded);
    assert_eq!(
        calls_for(&calls, "3.8")[1].arg_after("-r"),
        Some("requirements-dev.txt")
    );
}
