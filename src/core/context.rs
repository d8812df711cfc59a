//! Run context - the environment one run plan executes in

use crate::core::matrix::RunPlan;
use crate::provision::ToolchainHandle;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable disabling the optional native-extension build
pub const SKIP_NATIVE_BUILD_VAR: &str = "SKIP_CYTHON";

/// Environment variable marking execution inside automation
pub const CI_VAR: &str = "CI";

/// Environment variable pointing pip at the run's cache directory
pub const PIP_CACHE_DIR_VAR: &str = "PIP_CACHE_DIR";

/// Execution context for a single run plan
///
/// Every step of the plan is rendered against this context, so all commands
/// use the provisioned toolchain and nothing else.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The matrix combination being executed
    pub plan: RunPlan,

    /// Toolchain provisioned for this plan
    pub toolchain: ToolchainHandle,

    /// Package root; commands run here
    pub workdir: PathBuf,

    /// Environment passed to every step
    pub env: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new<P: Into<PathBuf>>(plan: RunPlan, toolchain: ToolchainHandle, workdir: P) -> Self {
        Self {
            plan,
            toolchain,
            workdir: workdir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Set an environment variable
    pub fn set_env<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.env.insert(key.into(), value.into());
    }

    /// Get an environment variable
    pub fn get_env(&self, key: &str) -> Option<&String> {
        self.env.get(key)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}
