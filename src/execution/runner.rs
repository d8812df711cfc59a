//! Command runner - spawns step commands as subprocesses

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Error types for command execution
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
}

/// A fully-resolved command for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout_secs: u64,
}

impl CommandSpec {
    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.contains(' ') {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// Value of the argument following the last `flag`
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .rposition(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Trait for running commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion. A non-zero exit is not an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as real subprocesses
///
/// The child is killed when the returned future is dropped, so cancelling a
/// step aborts the process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        debug!("Spawning: {}", spec.display());

        let result = timeout(
            Duration::from_secs(spec.timeout_secs),
            Command::new(&spec.program)
                .args(&spec.args)
                .envs(&spec.env)
                .current_dir(&spec.cwd)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| RunnerError::Timeout {
            command: spec.display(),
            secs: spec.timeout_secs,
        })?;

        let output = result.map_err(|e| RunnerError::Spawn {
            command: spec.display(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code();
        if !output.status.success() {
            warn!("`{}` exited with {:?}", spec.display(), exit_code);
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
