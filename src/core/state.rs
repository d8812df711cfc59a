//! Execution state models

use crate::cache::CacheStatus;
use crate::core::{error::StepError, matrix::RunPlan, step::{Step, StepPhase}};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name reported when a run fails before its first step
pub const SETUP_STEP: &str = "setup-python";

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Every run plan completed
    Completed,
    /// At least one run plan failed
    Failed,
    /// Pipeline was cancelled
    Cancelled,
}

/// Why a step was skipped without failing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ManifestMissing { path: String },
}

/// Outcome of a single attempted step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Succeeded,
    Skipped(SkipReason),
    Failed(StepError),
    /// Aborted mid-flight by cancellation
    Cancelled,
}

impl StepOutcome {
    /// Whether execution may continue to the next step
    pub fn is_passing(&self) -> bool {
        matches!(self, StepOutcome::Succeeded | StepOutcome::Skipped(_))
    }
}

/// Record of one attempted step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub phase: StepPhase,
    pub outcome: StepOutcome,
    /// Captured command output (empty when skipped)
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn new(step: &Step, outcome: StepOutcome, output: String, started_at: DateTime<Utc>) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            outcome,
            output,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Terminal status of one run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Failed { step: String, error: StepError },
    /// `step` is the interrupted step, if one was in flight
    Cancelled { step: Option<String> },
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// A single run plan's execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub plan: RunPlan,

    /// Rendered cache key, once derived
    pub cache_key: Option<String>,

    /// Outcome of cache restoration; `None` if never attempted
    pub cache_status: Option<CacheStatus>,

    /// Always a prefix of the declared step list
    pub step_results: Vec<StepResult>,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(plan: RunPlan) -> Self {
        Self {
            plan,
            cache_key: None,
            cache_status: None,
            step_results: Vec::new(),
            status: RunStatus::Cancelled { step: None },
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the terminal status
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Names of attempted steps, in execution order
    pub fn attempted_steps(&self) -> Vec<&str> {
        self.step_results.iter().map(|r| r.step.as_str()).collect()
    }

    pub fn result_for(&self, step: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step == step)
    }
}

/// Result of a whole pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow: String,

    /// One entry per run plan, in matrix order
    pub runs: Vec<PipelineRun>,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    /// Completed iff every run completed; any cancellation wins over failure
    pub fn status_of(runs: &[PipelineRun]) -> ExecutionStatus {
        if runs
            .iter()
            .any(|r| matches!(r.status, RunStatus::Cancelled { .. }))
        {
            ExecutionStatus::Cancelled
        } else if runs.iter().all(|r| r.status.is_success()) {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn failed_runs(&self) -> Vec<&PipelineRun> {
        self.runs.iter().filter(|r| !r.status.is_success()).collect()
    }

    pub fn run_for(&self, label: &str) -> Option<&PipelineRun> {
        self.runs.iter().find(|r| r.plan.label() == label)
    }
}
