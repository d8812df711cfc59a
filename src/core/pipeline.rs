//! Workflow domain model

use crate::cache::CachePolicy;
use crate::core::{
    config::WorkflowConfig,
    matrix::{MatrixExpander, RunPlan},
    step::{PackageAction, ShellCommand, Step, StepAction, StepPhase, TestCommand},
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const UPGRADE_PIP_STEP: &str = "upgrade-pip";
pub const INSTALL_REQUIREMENTS_STEP: &str = "install-requirements";
pub const INSTALL_TEST_RUNNER_STEP: &str = "install-test-runner";
pub const RUN_TESTS_STEP: &str = "run-tests";
pub const VERIFY_INSTALL_STEP: &str = "verify-install";

/// Names of the built-in steps, in execution order
pub const STANDARD_STEP_NAMES: [&str; 5] = [
    UPGRADE_PIP_STEP,
    INSTALL_REQUIREMENTS_STEP,
    INSTALL_TEST_RUNNER_STEP,
    RUN_TESTS_STEP,
    VERIFY_INSTALL_STEP,
];

/// A validated workflow ready for execution
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,

    /// Events that start the workflow
    pub triggers: Vec<String>,

    pub matrix: MatrixExpander,

    /// Axis whose value is the interpreter version to provision
    pub version_axis: String,

    pub cache: CachePolicy,

    /// Variables set for every step
    pub env: BTreeMap<String, String>,

    /// Ordered steps run for every plan
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        config.validate()?;

        let matrix = MatrixExpander::new(config.axes()?).with_exclusions(config.exclusions()?);
        let manifest = PathBuf::from(&config.cache.manifest);

        let mut steps = vec![
            Step::new(
                UPGRADE_PIP_STEP,
                StepPhase::InstallDependencies,
                StepAction::Package(PackageAction::UpgradeSelf),
            ),
            Step::new(
                INSTALL_REQUIREMENTS_STEP,
                StepPhase::InstallDependencies,
                StepAction::Package(PackageAction::InstallManifest {
                    manifest: manifest.clone(),
                }),
            ),
            Step::new(
                INSTALL_TEST_RUNNER_STEP,
                StepPhase::InstallDependencies,
                StepAction::Package(PackageAction::InstallPinned {
                    package: config.test.runner.clone(),
                    version: config.test.runner_version.clone(),
                }),
            ),
        ];

        for extra in &config.steps {
            let (program, args) = extra
                .run
                .split_first()
                .map(|(program, args)| (program.clone(), args.to_vec()))
                .unwrap_or_default();
            steps.push(Step::new(
                extra.name.clone(),
                StepPhase::RunTests,
                StepAction::Shell(ShellCommand { program, args }),
            ));
        }

        steps.push(Step::new(
            RUN_TESTS_STEP,
            StepPhase::RunTests,
            StepAction::Test(TestCommand {
                runner: config.test.runner.clone(),
                filter: config.test_filter()?,
            }),
        ));
        steps.push(Step::new(
            VERIFY_INSTALL_STEP,
            StepPhase::VerifyInstall,
            StepAction::Package(PackageAction::InstallLocal {
                path: PathBuf::from("."),
            }),
        ));

        let steps = steps
            .into_iter()
            .map(|step| step.with_timeout(config.step_timeout_secs))
            .collect();

        Ok(Workflow {
            name: config.name.clone(),
            triggers: config.on.events(),
            matrix,
            version_axis: config.version_axis.clone(),
            cache: CachePolicy {
                manifest,
                path: config.cache_root(),
                namespace: config.cache.namespace.clone(),
                restore_keys: config.cache.restore_keys.clone(),
            },
            env: config.env.to_env(),
            steps,
        })
    }

    /// Independent run plans in matrix order
    pub fn plans(&self) -> Vec<RunPlan> {
        self.matrix.expand()
    }

    pub fn is_triggered_by(&self, event: &str) -> bool {
        self.triggers.iter().any(|t| t == event)
    }

    /// Interpreter version for a plan; a plan without the version axis has none
    pub fn version_for<'a>(&self, plan: &'a RunPlan) -> Option<&'a str> {
        plan.get(&self.version_axis)
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}
