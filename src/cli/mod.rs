//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CacheCommand, PlanCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Matrix CI runner for Python packages
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-matrix")]
#[command(version)]
#[command(about = "Runs a Python package's CI workflow across an interpreter matrix", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow
    Run(RunCommand),

    /// Validate a workflow file
    Validate(ValidateCommand),

    /// Show the expanded matrix and cache key without running anything
    Plan(PlanCommand),

    /// Inspect the dependency cache store
    #[command(subcommand)]
    Cache(CacheCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
