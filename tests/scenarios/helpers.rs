//! Test utilities: a scripted command runner and a fake provisioner

use async_trait::async_trait;
use ci_matrix::cache::{CacheStore, InMemoryCacheStore};
use ci_matrix::core::{
    PipelineReport, PipelineRun, RunStatus, StepOutcome, TestFilter, Workflow, WorkflowConfig,
    PIP_CACHE_DIR_VAR,
};
use ci_matrix::execution::{
    CommandOutput, CommandRunner, CommandSpec, ExecutionEngine, ExecutionEvent, RunnerError,
};
use ci_matrix::provision::{EnvironmentProvisioner, ProvisionError, ToolchainHandle};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A test in the simulated suite
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub tags: Vec<String>,
    pub passes: bool,
}

pub fn case(name: &str, tags: &[&str], passes: bool) -> TestCase {
    TestCase {
        name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        passes,
    }
}

/// Runner that simulates pip and pytest without spawning anything
///
/// - commands whose rendering contains a `failing_on` needle exit 1
/// - `python -m pytest [-m EXPR]` runs the test catalogue through the marker filter
/// - `pip install -r MANIFEST` drops a wheel named after the manifest into `PIP_CACHE_DIR`,
///   unless the runner is `offline`
/// - `pip install .` builds in-tree, leaving `build/` in the working directory
#[derive(Default)]
pub struct ScriptedRunner {
    failing: Vec<String>,
    tests: Vec<TestCase>,
    delay: Option<Duration>,
    offline: bool,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    selected: Arc<Mutex<Vec<String>>>,
    stale_builds: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    pub fn with_tests(mut self, tests: Vec<TestCase>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Manifest installs succeed without downloading anything
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Shared log of every command run
    pub fn calls(&self) -> Arc<Mutex<Vec<CommandSpec>>> {
        self.calls.clone()
    }

    /// Shared log of every test the suite actually ran
    pub fn selected(&self) -> Arc<Mutex<Vec<String>>> {
        self.selected.clone()
    }

    /// Working directories where `pip install .` found another build's output
    pub fn stale_builds(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.stale_builds.clone()
    }

    fn run_suite(&self, spec: &CommandSpec) -> CommandOutput {
        let filter = if spec.args.len() > 2 {
            TestFilter::parse(spec.arg_after("-m").unwrap_or_default()).unwrap()
        } else {
            TestFilter::default()
        };

        let selected: Vec<&TestCase> = self.tests.iter().filter(|t| filter.selects(t.tags.as_slice())).collect();
        let failures = selected.iter().filter(|t| !t.passes).count();
        self.selected
            .lock()
            .unwrap()
            .extend(selected.iter().map(|t| t.name.clone()));

        CommandOutput {
            exit_code: Some(if failures > 0 { 1 } else { 0 }),
            stdout: format!(
                "collected {} items / {} deselected\n{} failed, {} passed",
                self.tests.len(),
                self.tests.len() - selected.len(),
                failures,
                selected.len() - failures
            ),
            stderr: String::new(),
        }
    }

    fn install_manifest(&self, spec: &CommandSpec) {
        let (Some(manifest), Some(cache_dir)) = (spec.arg_after("-r"), spec.env.get(PIP_CACHE_DIR_VAR)) else {
            return;
        };
        let contents = std::fs::read(spec.cwd.join(manifest)).unwrap_or_default();
        let wheels = Path::new(cache_dir).join("wheels");
        std::fs::create_dir_all(&wheels).unwrap();
        std::fs::write(wheels.join("deps.whl"), contents).unwrap();
    }

    fn build_in_tree(&self, spec: &CommandSpec) {
        let build = spec.cwd.join("build");
        if build.exists() {
            self.stale_builds.lock().unwrap().push(spec.cwd.clone());
        }
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("owner"), &spec.program).unwrap();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(spec.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rendered = spec.display();
        if self.failing.iter().any(|needle| rendered.contains(needle.as_str())) {
            return Ok(CommandOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("ERROR: scripted failure for `{}`", rendered),
            });
        }

        if spec.args.get(1).map(String::as_str) == Some("pytest") {
            return Ok(self.run_suite(spec));
        }

        if spec.args.iter().any(|a| a == "-r") && !self.offline {
            self.install_manifest(spec);
        }

        if spec.args.last().map(String::as_str) == Some(".") {
            self.build_in_tree(spec);
        }

        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "ok".to_string(),
            stderr: String::new(),
        })
    }
}

/// Provisioner with a fixed set of installed versions
pub struct MockProvisioner {
    available: Vec<String>,
}

impl MockProvisioner {
    pub fn with_versions(versions: &[&str]) -> Self {
        Self {
            available: versions.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[async_trait]
impl EnvironmentProvisioner for MockProvisioner {
    async fn provision(&self, version: &str) -> Result<ToolchainHandle, ProvisionError> {
        if self.available.iter().any(|v| v == version) {
            Ok(ToolchainHandle::new(version, interpreter(version)))
        } else {
            Err(ProvisionError::NotFound {
                version: version.to_string(),
                tried: format!("python{}", version),
            })
        }
    }
}

/// Interpreter path the mock provisioner hands out
pub fn interpreter(version: &str) -> String {
    format!("/mock/python{}/bin/python", version)
}

/// Temporary package root plus cache root
pub struct Sandbox {
    pub workdir: tempfile::TempDir,
    pub cache_root: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            workdir: tempfile::tempdir().unwrap(),
            cache_root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn with_requirements(contents: &str) -> Self {
        let sandbox = Self::new();
        sandbox.write_requirements(contents);
        sandbox
    }

    pub fn write_requirements(&self, contents: &str) {
        std::fs::write(self.workdir.path().join("requirements.txt"), contents).unwrap();
    }

    /// Parse a workflow and point its cache at the sandbox
    pub fn workflow(&self, yaml: &str) -> Workflow {
        let mut workflow = WorkflowConfig::from_yaml(yaml).unwrap().to_workflow().unwrap();
        workflow.cache.path = self.cache_root.path().to_path_buf();
        workflow
    }
}

/// Run a workflow on `push` and collect the emitted events
pub async fn run_workflow(
    sandbox: &Sandbox,
    workflow: &Workflow,
    provisioner: MockProvisioner,
    runner: ScriptedRunner,
    store: Arc<dyn CacheStore>,
) -> (PipelineReport, Vec<ExecutionEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut engine = ExecutionEngine::new(provisioner, runner, store);
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let report = engine.execute(workflow, sandbox.workdir.path(), "push").await;
    let events = events.lock().unwrap().clone();
    (report, events)
}

pub fn memory_store() -> Arc<dyn CacheStore> {
    Arc::new(InMemoryCacheStore::new())
}

pub fn run<'a>(report: &'a PipelineReport, version: &str) -> &'a PipelineRun {
    let label = format!("python-version={}", version);
    report
        .run_for(&label)
        .unwrap_or_else(|| panic!("no run for {}", label))
}

pub fn assert_run_completed(report: &PipelineReport, version: &str) {
    let run = run(report, version);
    assert_eq!(run.status, RunStatus::Completed, "run {} should complete", version);
}

pub fn assert_run_failed_at(report: &PipelineReport, version: &str, step: &str) {
    match &run(report, version).status {
        RunStatus::Failed { step: failed, .. } => {
            assert_eq!(failed, step, "run {} failed at the wrong step", version)
        }
        other => panic!("run {} should have failed at {}, got {:?}", version, step, other),
    }
}

pub fn assert_attempted(report: &PipelineReport, version: &str, steps: &[&str]) {
    assert_eq!(run(report, version).attempted_steps(), steps.to_vec());
}

pub fn assert_outcome(report: &PipelineReport, version: &str, step: &str, expected: &StepOutcome) {
    let result = run(report, version)
        .result_for(step)
        .unwrap_or_else(|| panic!("{} was not attempted for {}", step, version));
    assert_eq!(&result.outcome, expected);
}

/// Commands run with the given interpreter
pub fn calls_for(calls: &Arc<Mutex<Vec<CommandSpec>>>, version: &str) -> Vec<CommandSpec> {
    let program = interpreter(version);
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.program == program)
        .cloned()
        .collect()
}
