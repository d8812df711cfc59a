//! Pipeline execution engine

pub mod cancel;
pub mod engine;
pub mod executor;
pub mod runner;
pub mod workspace;

pub use cancel::CancelSignal;
pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, StepExecutor, StepObserver};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, RunnerError};
pub use workspace::RunWorkspace;
