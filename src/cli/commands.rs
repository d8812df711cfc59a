//! CLI command definitions

use crate::core::WorkflowConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file; the built-in workflow when omitted
    #[arg(short, long)]
    pub file: Option<String>,

    /// Package root the steps run in
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Event that triggered this run
    #[arg(long, default_value = "push")]
    pub event: String,

    /// Keep the dependency cache in memory for this invocation only
    #[arg(long)]
    pub no_cache_store: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show what a run would do
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to workflow YAML file; the built-in workflow when omitted
    #[arg(short, long)]
    pub file: Option<String>,

    /// Package root the cache key is derived from
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,
}

/// Cache store commands
#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// List stored cache entries, newest first
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Load the workflow file, or the built-in workflow when none is given
pub fn load_config(file: Option<&str>) -> Result<WorkflowConfig> {
    match file {
        Some(path) => WorkflowConfig::from_file(path)
            .with_context(|| format!("Failed to load workflow {}", path)),
        None => Ok(WorkflowConfig::default()),
    }
}
