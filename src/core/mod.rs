//! Core domain models
//!
//! This module defines the workflow, its matrix expansion, steps, and the
//! state recorded while runs execute.

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod matrix;
pub mod pipeline;
pub mod state;
pub mod step;

pub use config::WorkflowConfig;
pub use context::*;
pub use error::StepError;
pub use filter::TestFilter;
pub use matrix::{MatrixAxis, MatrixExpander, RunPlan};
pub use pipeline::*;
pub use state::*;
pub use step::*;
