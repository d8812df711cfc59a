//! Step executor - runs a run plan's steps in order, stopping at the first failure

use crate::{
    core::{RunContext, RunStatus, Step, StepOutcome, StepResult},
    execution::{cancel::CancelSignal, runner::CommandRunner},
};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Receives step lifecycle notifications
pub trait StepObserver: Send + Sync {
    fn on_step_started(&self, _step: &Step) {}
    fn on_step_finished(&self, _result: &StepResult) {}
}

/// Results of one run plan's step sequence
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// A prefix of the declared steps
    pub results: Vec<StepResult>,
    pub status: RunStatus,
}

/// Executes steps with a command runner
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a single step and return its result
    pub async fn execute_step(&self, step: &Step, context: &RunContext) -> StepResult {
        let started_at = Utc::now();

        if let Some(reason) = step.skip_reason(context) {
            info!("[{}] Skipping {}: {:?}", context.plan, step.name, reason);
            return StepResult::new(step, StepOutcome::Skipped(reason), String::new(), started_at);
        }

        let spec = step.command(context);
        info!("[{}] {}: {}", context.plan, step.name, spec.display());

        match self.runner.run(&spec).await {
            Ok(output) if output.success() => {
                debug!("[{}] {} succeeded", context.plan, step.name);
                StepResult::new(step, StepOutcome::Succeeded, output.combined(), started_at)
            }
            Ok(output) => {
                let error = step.failure(&spec, &output);
                warn!("[{}] {} failed: {}", context.plan, step.name, error);
                StepResult::new(step, StepOutcome::Failed(error), output.combined(), started_at)
            }
            Err(e) => {
                warn!("[{}] {} could not run: {}", context.plan, step.name, e);
                StepResult::new(step, StepOutcome::Failed(e.into()), String::new(), started_at)
            }
        }
    }

    /// Execute `steps` strictly in order.
    ///
    /// Halts at the first failing step; later steps are never attempted. A
    /// cancel aborts the in-flight step, which is recorded as `Cancelled`.
    pub async fn execute(
        &self,
        steps: &[Step],
        context: &RunContext,
        cancel: &CancelSignal,
        observer: Option<&dyn StepObserver>,
    ) -> ExecutionResult {
        let mut results = Vec::with_capacity(steps.len());

        for step in steps {
            if cancel.is_cancelled() {
                info!("[{}] Cancelled before {}", context.plan, step.name);
                return ExecutionResult {
                    results,
                    status: RunStatus::Cancelled { step: None },
                };
            }

            if let Some(observer) = observer {
                observer.on_step_started(step);
            }

            let started_at = Utc::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("[{}] {} interrupted", context.plan, step.name);
                    StepResult::new(step, StepOutcome::Cancelled, String::new(), started_at)
                }
                result = self.execute_step(step, context) => result,
            };

            if let Some(observer) = observer {
                observer.on_step_finished(&result);
            }

            let status = match &result.outcome {
                StepOutcome::Succeeded | StepOutcome::Skipped(_) => None,
                StepOutcome::Failed(error) => Some(RunStatus::Failed {
                    step: step.name.clone(),
                    error: error.clone(),
                }),
                StepOutcome::Cancelled => Some(RunStatus::Cancelled {
                    step: Some(step.name.clone()),
                }),
            };

            results.push(result);
            if let Some(status) = status {
                return ExecutionResult { results, status };
            }
        }

        ExecutionResult {
            results,
            status: RunStatus::Completed,
        }
    }
}
