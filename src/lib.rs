//! ci-matrix - runs a Python package's CI workflow across an interpreter matrix

pub mod cache;
pub mod cli;
pub mod core;
pub mod execution;
pub mod provision;

// Re-export commonly used types
pub use cache::{CacheKey, CacheResolver, CacheStatus, CacheStore, InMemoryCacheStore};
pub use core::{ExecutionStatus, PipelineReport, RunPlan, RunStatus, Step, StepError, Workflow, WorkflowConfig};
pub use execution::{CancelSignal, CommandRunner, ExecutionEngine, ExecutionEvent, ProcessRunner};
pub use provision::{EnvironmentProvisioner, LocalProvisioner, ToolchainHandle};
