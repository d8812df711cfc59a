//! Workflow configuration from YAML

use crate::core::{
    context::{CI_VAR, SKIP_NATIVE_BUILD_VAR},
    filter::TestFilter,
    matrix::{ExcludeRule, MatrixAxis},
    pipeline::{Workflow, STANDARD_STEP_NAMES},
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Matrix key holding exclusion rules rather than an axis
const EXCLUDE_KEY: &str = "exclude";

/// Matrix key for additional combinations (not supported)
const INCLUDE_KEY: &str = "include";

/// Events that trigger the workflow - a single name or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Triggers {
    One(String),
    Many(Vec<String>),
}

impl Triggers {
    pub fn events(&self) -> Vec<String> {
        match self {
            Triggers::One(event) => vec![event.clone()],
            Triggers::Many(events) => events.clone(),
        }
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Triggers::Many(vec!["push".to_string()])
    }
}

/// Top-level workflow configuration loaded from YAML
///
/// Every field has a default; an empty mapping describes the reference
/// Python package workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Trigger events
    pub on: Triggers,

    /// Matrix axis whose value selects the interpreter version
    pub version_axis: String,

    /// Axes (name -> values) plus an optional `exclude` list
    pub matrix: Mapping,

    pub cache: CacheConfig,

    pub env: EnvConfig,

    pub test: TestConfig,

    /// Extra commands run after dependency installation, before the tests
    pub steps: Vec<ShellStepConfig>,

    /// Timeout for every step (in seconds)
    pub step_timeout_secs: u64,
}

/// Dependency cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Manifest hashed into the cache key and installed from
    pub manifest: String,

    /// Root directory for local caches; `~/` expands to the home directory
    pub path: String,

    /// Literal namespace component of the key
    pub namespace: String,

    /// Fallback key prefixes; empty means `<os>-<namespace>-`
    pub restore_keys: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            manifest: "requirements.txt".to_string(),
            path: "~/.cache/ci-matrix/pip".to_string(),
            namespace: "pip".to_string(),
            restore_keys: Vec::new(),
        }
    }
}

/// Environment switches passed to every step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Sets `SKIP_CYTHON=1`
    pub skip_native_build: bool,

    /// Sets `CI=true`
    pub ci: bool,

    /// Additional variables
    pub extra: BTreeMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            skip_native_build: true,
            ci: true,
            extra: BTreeMap::new(),
        }
    }
}

impl EnvConfig {
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = self.extra.clone();
        if self.skip_native_build {
            env.insert(SKIP_NATIVE_BUILD_VAR.to_string(), "1".to_string());
        }
        if self.ci {
            env.insert(CI_VAR.to_string(), "true".to_string());
        }
        env
    }
}

/// Test execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Test runner package, also its module name
    pub runner: String,

    /// Exact version the runner is pinned to
    pub runner_version: String,

    /// Tests carrying any of these tags are deselected
    pub exclude_tags: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            runner: "pytest".to_string(),
            runner_version: "6.2.2".to_string(),
            exclude_tags: vec!["bug".to_string()],
        }
    }
}

/// An extra command step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellStepConfig {
    /// Unique step name
    pub name: String,

    /// Program and arguments; a leading `python` is the provisioned interpreter
    pub run: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let mut matrix = Mapping::new();
        matrix.insert(
            Value::String("python-version".to_string()),
            Value::Sequence(
                ["3.7", "3.8", "3.9"]
                    .iter()
                    .map(|v| Value::String(v.to_string()))
                    .collect(),
            ),
        );

        Self {
            name: "Python package".to_string(),
            on: Triggers::default(),
            version_axis: "python-version".to_string(),
            matrix,
            cache: CacheConfig::default(),
            env: EnvConfig::default(),
            test: TestConfig::default(),
            steps: Vec::new(),
            step_timeout_secs: 1800,
        }
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Workflow name must not be empty");
        }

        if self.on.events().is_empty() {
            bail!("Workflow must declare at least one trigger event");
        }

        let axes = self.axes()?;
        let axis_names: HashSet<&str> = axes.iter().map(|a| a.name.as_str()).collect();
        if !axes.is_empty() && !axis_names.contains(self.version_axis.as_str()) {
            bail!("Matrix has no '{}' axis to select the interpreter version", self.version_axis);
        }

        for (index, rule) in self.exclusions()?.iter().enumerate() {
            if rule.is_empty() {
                bail!("Matrix exclude entry {} is empty", index + 1);
            }
            for (axis, _) in rule {
                if !axis_names.contains(axis.as_str()) {
                    bail!("Matrix exclude entry {} references unknown axis '{}'", index + 1, axis);
                }
            }
        }

        if self.cache.manifest.trim().is_empty() {
            bail!("Cache manifest must not be empty");
        }
        if self.cache.namespace.trim().is_empty() {
            bail!("Cache namespace must not be empty");
        }

        if self.test.runner.trim().is_empty() {
            bail!("Test runner must not be empty");
        }
        if self.test.runner_version.trim().is_empty() {
            bail!("Test runner '{}' must be pinned to a version", self.test.runner);
        }
        self.test_filter()?;

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.run.is_empty() {
                bail!("Step '{}' has an empty run command", step.name);
            }
            if STANDARD_STEP_NAMES.contains(&step.name.as_str()) {
                bail!("Step name '{}' is reserved", step.name);
            }
            if !seen.insert(&step.name) {
                bail!("Duplicate step name: {}", step.name);
            }
        }

        if self.step_timeout_secs == 0 {
            bail!("step_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Matrix axes in declaration order
    pub fn axes(&self) -> Result<Vec<MatrixAxis>> {
        let mut axes = Vec::new();

        for (key, value) in &self.matrix {
            let name = key
                .as_str()
                .context("Matrix axis names must be strings")?;

            if name == EXCLUDE_KEY {
                continue;
            }
            if name == INCLUDE_KEY {
                bail!("Matrix 'include' is not supported");
            }

            let values = match value {
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| self.axis_value(name, item))
                    .collect::<Result<Vec<_>>>()?,
                _ => bail!("Matrix axis '{}' must be a list of values", name),
            };

            axes.push(MatrixAxis::new(name, values));
        }

        Ok(axes)
    }

    /// Matrix exclusion rules
    pub fn exclusions(&self) -> Result<Vec<ExcludeRule>> {
        let Some(value) = self.matrix.get(EXCLUDE_KEY) else {
            return Ok(Vec::new());
        };

        let entries = value
            .as_sequence()
            .context("Matrix 'exclude' must be a list")?;

        entries
            .iter()
            .map(|entry| {
                let map = entry
                    .as_mapping()
                    .context("Matrix 'exclude' entries must be mappings")?;
                map.iter()
                    .map(|(k, v)| {
                        let axis = k.as_str().context("Exclude keys must be strings")?;
                        Ok((axis.to_string(), self.axis_value(axis, v)?))
                    })
                    .collect::<Result<ExcludeRule>>()
            })
            .collect()
    }

    /// Render one matrix value; versions must be quoted
    fn axis_value(&self, axis: &str, value: &Value) -> Result<String> {
        if axis == self.version_axis && value.is_f64() {
            bail!(
                "Version {:?} on axis '{}' must be quoted; YAML reads unquoted versions as numbers, so 3.10 becomes 3.1",
                value.as_f64().unwrap_or_default(),
                axis
            );
        }
        scalar_to_string(value)
            .with_context(|| format!("Matrix values for '{}' must be scalars", axis))
    }

    pub fn test_filter(&self) -> Result<TestFilter> {
        TestFilter::excluding(self.test.exclude_tags.iter().cloned())
            .context("Invalid test exclusion tags")
    }

    /// Local cache root with `~/` expanded
    pub fn cache_root(&self) -> PathBuf {
        expand_home(&self.cache.path)
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
