//! Main execution engine - fans a workflow out into parallel run plans

use crate::{
    cache::{CacheResolver, CacheStatus, CacheStore, PutOutcome},
    core::{
        ExecutionStatus, PipelineReport, PipelineRun, RunContext, RunPlan, RunStatus, Step,
        StepError, StepOutcome, StepResult, Workflow, PIP_CACHE_DIR_VAR, SETUP_STEP,
    },
    execution::{
        cancel::CancelSignal,
        executor::{StepExecutor, StepObserver},
        runner::CommandRunner,
        workspace::RunWorkspace,
    },
    provision::EnvironmentProvisioner,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        workflow: String,
        runs: usize,
        steps_per_run: usize,
    },
    RunStarted {
        plan: RunPlan,
    },
    Provisioned {
        plan: RunPlan,
        interpreter: PathBuf,
    },
    CacheRestored {
        plan: RunPlan,
        key: String,
        status: CacheStatus,
    },
    StepStarted {
        plan: RunPlan,
        step: String,
    },
    StepFinished {
        plan: RunPlan,
        step: String,
        outcome: StepOutcome,
    },
    CacheSaved {
        plan: RunPlan,
        key: String,
        outcome: PutOutcome,
    },
    RunFinished {
        plan: RunPlan,
        status: RunStatus,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

#[derive(Clone, Default)]
struct Emitter {
    handlers: Arc<Vec<EventHandler>>,
}

impl Emitter {
    fn emit(&self, event: ExecutionEvent) {
        for handler in self.handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Forwards step notifications of one plan as execution events
struct PlanObserver<'a> {
    emitter: &'a Emitter,
    plan: &'a RunPlan,
}

impl StepObserver for PlanObserver<'_> {
    fn on_step_started(&self, step: &Step) {
        self.emitter.emit(ExecutionEvent::StepStarted {
            plan: self.plan.clone(),
            step: step.name.clone(),
        });
    }

    fn on_step_finished(&self, result: &StepResult) {
        self.emitter.emit(ExecutionEvent::StepFinished {
            plan: self.plan.clone(),
            step: result.step.clone(),
            outcome: result.outcome.clone(),
        });
    }
}

/// Everything one run-plan task needs
struct RunScope<P, R> {
    workflow: Workflow,
    workdir: PathBuf,
    provisioner: Arc<P>,
    executor: Arc<StepExecutor<R>>,
    cache: CacheResolver,
    cancel: CancelSignal,
    emitter: Emitter,
}

/// Main pipeline execution engine
pub struct ExecutionEngine<P, R> {
    provisioner: Arc<P>,
    executor: Arc<StepExecutor<R>>,
    cache: CacheResolver,
    cancel: CancelSignal,
    event_handlers: Vec<EventHandler>,
}

impl<P, R> ExecutionEngine<P, R>
where
    P: EnvironmentProvisioner + 'static,
    R: CommandRunner + 'static,
{
    pub fn new(provisioner: P, runner: R, store: Arc<dyn CacheStore>) -> Self {
        Self {
            provisioner: Arc::new(provisioner),
            executor: Arc::new(StepExecutor::new(runner)),
            cache: CacheResolver::new(store),
            cancel: CancelSignal::new(),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Signal that cancels every run of this engine
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &CacheResolver {
        &self.cache
    }

    /// Execute `workflow` in `workdir` in response to `event`.
    ///
    /// Every run plan runs in its own task; a failing plan never stops the
    /// others. Runs in the report keep matrix order.
    pub async fn execute(&self, workflow: &Workflow, workdir: &Path, event: &str) -> PipelineReport {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let emitter = Emitter {
            handlers: Arc::new(self.event_handlers.clone()),
        };

        let plans = if workflow.is_triggered_by(event) {
            workflow.plans()
        } else {
            info!(
                "Workflow {} is not triggered by '{}' (triggers: {})",
                workflow.name,
                event,
                workflow.triggers.join(", ")
            );
            Vec::new()
        };

        info!(
            "Starting workflow {} ({}) with {} run(s)",
            workflow.name,
            execution_id,
            plans.len()
        );
        emitter.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            workflow: workflow.name.clone(),
            runs: plans.len(),
            steps_per_run: workflow.steps.len(),
        });

        let scope = Arc::new(RunScope {
            workflow: workflow.clone(),
            workdir: workdir.to_path_buf(),
            provisioner: self.provisioner.clone(),
            executor: self.executor.clone(),
            cache: self.cache.clone(),
            cancel: self.cancel.clone(),
            emitter: emitter.clone(),
        });

        let handles: Vec<_> = plans
            .iter()
            .cloned()
            .map(|plan| {
                let scope = scope.clone();
                tokio::spawn(async move { run_plan(&scope, plan).await })
            })
            .collect();

        let mut runs = Vec::with_capacity(handles.len());
        for (plan, handle) in plans.into_iter().zip(handles) {
            let run = match handle.await {
                Ok(run) => run,
                Err(e) => {
                    error!("[{}] Run task aborted: {}", plan, e);
                    let mut run = PipelineRun::new(plan.clone());
                    let status = RunStatus::Failed {
                        step: SETUP_STEP.to_string(),
                        error: StepError::Aborted {
                            message: e.to_string(),
                        },
                    };
                    run.finish(status.clone());
                    emitter.emit(ExecutionEvent::RunFinished { plan, status });
                    run
                }
            };
            runs.push(run);
        }

        let status = PipelineReport::status_of(&runs);
        info!("Workflow {} finished: {:?}", workflow.name, status);
        emitter.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        });

        PipelineReport {
            execution_id,
            workflow: workflow.name.clone(),
            runs,
            status,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

/// Provision, restore the cache, run the steps, and save the cache for one plan
async fn run_plan<P, R>(scope: &RunScope<P, R>, plan: RunPlan) -> PipelineRun
where
    P: EnvironmentProvisioner,
    R: CommandRunner,
{
    let mut run = PipelineRun::new(plan.clone());
    scope.emitter.emit(ExecutionEvent::RunStarted { plan: plan.clone() });

    let status = run_steps(scope, &plan, &mut run).await;

    info!("[{}] Finished: {:?}", plan, status);
    run.finish(status.clone());
    scope.emitter.emit(ExecutionEvent::RunFinished { plan, status });
    run
}

async fn run_steps<P, R>(scope: &RunScope<P, R>, plan: &RunPlan, run: &mut PipelineRun) -> RunStatus
where
    P: EnvironmentProvisioner,
    R: CommandRunner,
{
    if scope.cancel.is_cancelled() {
        return RunStatus::Cancelled { step: None };
    }

    let Some(version) = scope.workflow.version_for(plan) else {
        return RunStatus::Failed {
            step: SETUP_STEP.to_string(),
            error: StepError::Provision {
                version: String::new(),
                message: format!("plan has no '{}' value", scope.workflow.version_axis),
            },
        };
    };

    let workspace = match RunWorkspace::stage(&scope.workdir, plan).await {
        Ok(workspace) => workspace,
        Err(e) => {
            warn!("[{}] Could not stage the package root: {:#}", plan, e);
            return RunStatus::Failed {
                step: SETUP_STEP.to_string(),
                error: StepError::Workspace {
                    message: format!("{:#}", e),
                },
            };
        }
    };

    let provisioned = tokio::select! {
        biased;
        _ = scope.cancel.cancelled() => {
            return RunStatus::Cancelled { step: Some(SETUP_STEP.to_string()) };
        }
        provisioned = scope.provisioner.provision(version) => provisioned,
    };
    let toolchain = match provisioned {
        Ok(toolchain) => toolchain,
        Err(e) => {
            warn!("[{}] Provisioning failed: {}", plan, e);
            return RunStatus::Failed {
                step: SETUP_STEP.to_string(),
                error: StepError::Provision {
                    version: version.to_string(),
                    message: e.to_string(),
                },
            };
        }
    };
    info!("[{}] Using {}", plan, toolchain.interpreter.display());
    scope.emitter.emit(ExecutionEvent::Provisioned {
        plan: plan.clone(),
        interpreter: toolchain.interpreter.clone(),
    });

    let policy = &scope.workflow.cache;
    let cache_dir = policy.dir_for(plan);
    // Keyed on the caller's manifest, not the copy
    let key = match policy.key_for(&scope.workdir) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("[{}] Could not derive cache key; running uncached: {:#}", plan, e);
            None
        }
    };

    if let Some(key) = &key {
        let prefixes = policy.restore_prefixes(key);
        let status = scope.cache.restore(key, &prefixes, &cache_dir).await;
        run.cache_key = Some(key.to_string());
        run.cache_status = Some(status.clone());
        scope.emitter.emit(ExecutionEvent::CacheRestored {
            plan: plan.clone(),
            key: key.to_string(),
            status,
        });
    }

    let mut context = RunContext::new(plan.clone(), toolchain, workspace.path())
        .with_env(scope.workflow.env.clone());
    context.set_env(PIP_CACHE_DIR_VAR, cache_dir.to_string_lossy());

    let observer = PlanObserver {
        emitter: &scope.emitter,
        plan,
    };
    let result = scope
        .executor
        .execute(&scope.workflow.steps, &context, &scope.cancel, Some(&observer))
        .await;
    run.step_results = result.results;

    if result.status.is_success() {
        if let (Some(key), Some(restored)) = (&key, &run.cache_status) {
            if let Some(outcome) = scope.cache.save(key, restored, &cache_dir).await {
                scope.emitter.emit(ExecutionEvent::CacheSaved {
                    plan: plan.clone(),
                    key: key.to_string(),
                    outcome,
                });
            }
        }
    }

    result.status
}
