//! Step failure taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fatal error that halts a run plan
///
/// Non-fatal conditions (a missing manifest, a cache miss) never become a
/// `StepError`; they are recorded as a skip reason or a cache status instead.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("failed to provision Python {version}: {message}")]
    Provision { version: String, message: String },

    #[error("`{command}` {}", describe_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("could not install {package}=={version} ({})", describe_exit(.exit_code))]
    VersionPinMismatch {
        package: String,
        version: String,
        exit_code: Option<i32>,
    },

    #[error("test suite failed ({})", describe_exit(.exit_code))]
    TestExecutionFailure { exit_code: Option<i32> },

    #[error("package failed to install from its own root ({})", describe_exit(.exit_code))]
    InstallVerificationFailure { exit_code: Option<i32> },

    #[error("failed to stage a private copy of the package root: {message}")]
    Workspace { message: String },

    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("run aborted unexpectedly: {message}")]
    Aborted { message: String },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}
