//! Runtime environment provisioning

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use local::LocalProvisioner;

/// Error types for provisioning
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no interpreter found for Python {version} (tried: {tried})")]
    NotFound { version: String, tried: String },

    #[error("interpreter probe for Python {version} timed out after {secs} seconds")]
    Timeout { version: String, secs: u64 },
}

/// A provisioned toolchain; every command of a run plan executes against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainHandle {
    /// Version requested by the run plan
    pub version: String,

    /// Interpreter executable
    pub interpreter: PathBuf,
}

impl ToolchainHandle {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(version: S, interpreter: P) -> Self {
        Self {
            version: version.into(),
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter_str(&self) -> String {
        self.interpreter.to_string_lossy().into_owned()
    }
}

/// Trait for provisioning - allows for different implementations
#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    /// Materialize an environment for the given version identifier
    async fn provision(&self, version: &str) -> Result<ToolchainHandle, ProvisionError>;
}
