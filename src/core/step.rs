//! Step domain model

use crate::core::{
    context::RunContext,
    error::StepError,
    filter::TestFilter,
    state::SkipReason,
};
use crate::execution::runner::{CommandOutput, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Program name that resolves to the provisioned interpreter in shell steps
pub const INTERPRETER_PLACEHOLDER: &str = "python";

/// Coarse grouping of steps, as reported to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepPhase {
    InstallDependencies,
    RunTests,
    VerifyInstall,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::InstallDependencies => "install-dependencies",
            StepPhase::RunTests => "run-tests",
            StepPhase::VerifyInstall => "verify-install",
        }
    }
}

/// Package-manager operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageAction {
    /// Upgrade the package manager itself
    UpgradeSelf,
    /// Install from a manifest; skipped when the manifest is absent
    InstallManifest { manifest: PathBuf },
    /// Install an exact version; anything else is a failure
    InstallPinned { package: String, version: String },
    /// Install the package from its own root
    InstallLocal { path: PathBuf },
}

/// An arbitrary command; `python` resolves to the provisioned interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Test-suite invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCommand {
    /// Test runner module, run as `python -m <runner>`
    pub runner: String,
    pub filter: TestFilter,
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Shell(ShellCommand),
    Package(PackageAction),
    Test(TestCommand),
}

/// A single step in a run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Unique step name
    pub name: String,

    pub phase: StepPhase,

    pub action: StepAction,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

impl Step {
    pub fn new<S: Into<String>>(name: S, phase: StepPhase, action: StepAction) -> Self {
        Step {
            name: name.into(),
            phase,
            action,
            timeout_secs: StepDefaults::default().timeout_secs,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Why this step should not run in the given context, if it shouldn't
    pub fn skip_reason(&self, context: &RunContext) -> Option<SkipReason> {
        match &self.action {
            StepAction::Package(PackageAction::InstallManifest { manifest }) => {
                if context.workdir().join(manifest).is_file() {
                    None
                } else {
                    Some(SkipReason::ManifestMissing {
                        path: manifest.to_string_lossy().into_owned(),
                    })
                }
            }
            _ => None,
        }
    }

    /// Render the command against the run's toolchain
    pub fn command(&self, context: &RunContext) -> CommandSpec {
        let interpreter = context.toolchain.interpreter_str();
        let pip = |rest: Vec<String>| {
            let mut args = vec!["-m".to_string(), "pip".to_string(), "install".to_string()];
            args.extend(rest);
            args
        };

        let (program, args) = match &self.action {
            StepAction::Package(PackageAction::UpgradeSelf) => (
                interpreter,
                pip(vec!["--upgrade".to_string(), "pip".to_string()]),
            ),
            StepAction::Package(PackageAction::InstallManifest { manifest }) => (
                interpreter,
                pip(vec!["-r".to_string(), manifest.to_string_lossy().into_owned()]),
            ),
            StepAction::Package(PackageAction::InstallPinned { package, version }) => (
                interpreter,
                pip(vec![format!("{}=={}", package, version)]),
            ),
            StepAction::Package(PackageAction::InstallLocal { path }) => (
                interpreter,
                pip(vec![path.to_string_lossy().into_owned()]),
            ),
            StepAction::Test(test) => {
                let mut args = vec!["-m".to_string(), test.runner.clone()];
                if let Some(expression) = test.filter.marker_expression() {
                    args.push("-m".to_string());
                    args.push(expression);
                }
                (interpreter, args)
            }
            StepAction::Shell(shell) => {
                let program = if shell.program == INTERPRETER_PLACEHOLDER {
                    interpreter
                } else {
                    shell.program.clone()
                };
                (program, shell.args.clone())
            }
        };

        CommandSpec {
            program,
            args,
            env: context.env.clone(),
            cwd: context.workdir.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    /// Classify a non-zero exit of this step's command
    pub fn failure(&self, spec: &CommandSpec, output: &CommandOutput) -> StepError {
        let exit_code = output.exit_code;
        match &self.action {
            StepAction::Package(PackageAction::InstallPinned { package, version }) => {
                StepError::VersionPinMismatch {
                    package: package.clone(),
                    version: version.clone(),
                    exit_code,
                }
            }
            StepAction::Package(PackageAction::InstallLocal { .. }) => {
                StepError::InstallVerificationFailure { exit_code }
            }
            StepAction::Test(_) => StepError::TestExecutionFailure { exit_code },
            _ => StepError::CommandFailed {
                command: spec.display(),
                exit_code,
            },
        }
    }
}

impl From<RunnerError> for StepError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Spawn { command, message } => StepError::Spawn { command, message },
            RunnerError::Timeout { command, secs } => StepError::Timeout { command, secs },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 1800, // 30 minutes
        }
    }
}
