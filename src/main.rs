use anyhow::{Context, Result};
use ci_matrix::cache::{CachePolicy, CacheStore, InMemoryCacheStore};
use ci_matrix::cli::commands::{load_config, CacheCommand, PlanCommand, RunCommand, ValidateCommand};
use ci_matrix::cli::output::*;
use ci_matrix::cli::{Cli, Command};
use ci_matrix::core::{ExecutionStatus, RunContext};
use ci_matrix::execution::{ExecutionEngine, ExecutionEvent, ProcessRunner};
use ci_matrix::provision::{LocalProvisioner, ToolchainHandle};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Exit code when interrupted by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await,
        Command::Validate(cmd) => validate_workflow(cmd),
        Command::Plan(cmd) => show_plan(cmd),
        Command::Cache(CacheCommand::List { json }) => list_cache(*json).await,
    }
}

async fn open_store(no_cache_store: bool) -> Result<Arc<dyn CacheStore>> {
    if no_cache_store {
        Ok(Arc::new(InMemoryCacheStore::new()))
    } else {
        persistent_store().await
    }
}

#[cfg(feature = "sqlite")]
async fn persistent_store() -> Result<Arc<dyn CacheStore>> {
    let store = ci_matrix::cache::SqliteCacheStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn persistent_store() -> Result<Arc<dyn CacheStore>> {
    warn!("Built without the sqlite feature; the cache lasts for this run only");
    Ok(Arc::new(InMemoryCacheStore::new()))
}

async fn run_workflow(cmd: &RunCommand) -> Result<ExitCode> {
    let config = load_config(cmd.file.as_deref())?;
    let workflow = config.to_workflow()?;
    let workdir = cmd
        .workdir
        .canonicalize()
        .with_context(|| format!("Working directory {} not found", cmd.workdir.display()))?;

    if !cmd.json {
        println!("{} Loaded workflow: {}", INFO, style(&workflow.name).bold());
    }

    let store = open_store(cmd.no_cache_store).await?;
    let mut engine = ExecutionEngine::new(LocalProvisioner::default(), ProcessRunner::new(), store);

    // Set up event handler for console output
    let progress = if cmd.json {
        indicatif::ProgressBar::hidden()
    } else {
        create_progress_bar(0)
    };
    let bar = progress.clone();
    let quiet = cmd.json;
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::PipelineStarted {
                runs,
                steps_per_run,
                ..
            } => bar.set_length((runs * steps_per_run) as u64),
            ExecutionEvent::StepStarted { plan, step } => bar.set_message(format!("{} {}", plan, step)),
            ExecutionEvent::StepFinished { .. } => bar.inc(1),
            _ => {}
        }
        if !quiet {
            bar.println(format_execution_event(&event));
        }
    });

    let cancel = engine.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling runs");
            cancel.cancel();
        }
    });

    let report = engine.execute(&workflow, &workdir, &cmd.event).await;
    progress.finish_and_clear();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", separator());
        for run in &report.runs {
            println!("  {}", format_run_summary(run));
        }
        for run in report.failed_runs() {
            if let Some(last) = run.step_results.last() {
                if !last.output.is_empty() {
                    println!(
                        "\n{} Output of {} [{}]:\n{}",
                        WARN,
                        style(&last.step).bold(),
                        style(&run.plan).cyan(),
                        format_output(&last.output, 20)
                    );
                }
            }
        }
    }

    let code = match report.status {
        ExecutionStatus::Completed => {
            if !cmd.json {
                println!(
                    "\n{} {} completed {}",
                    CHECK,
                    style(&report.workflow).bold(),
                    style("successfully").green()
                );
            }
            ExitCode::SUCCESS
        }
        ExecutionStatus::Cancelled => {
            if !cmd.json {
                println!("\n{} {} {}", WARN, style(&report.workflow).bold(), style("cancelled").yellow());
            }
            ExitCode::from(EXIT_CANCELLED)
        }
        ExecutionStatus::Failed => {
            if !cmd.json {
                println!("\n{} {} {}", CROSS, style(&report.workflow).bold(), style("failed").red());
            }
            error!("{} of {} run(s) failed", report.failed_runs().len(), report.runs.len());
            ExitCode::FAILURE
        }
    };

    Ok(code)
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<ExitCode> {
    println!("{} Validating workflow...", INFO);

    match load_config(Some(&cmd.file)) {
        Ok(config) => {
            let plans = config.to_workflow()?.plans();
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Triggers: {}", style(config.on.events().join(", ")).cyan());
            println!("  Runs: {}", style(plans.len()).cyan());
            println!("  Extra steps: {}", style(config.steps.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn show_plan(cmd: &PlanCommand) -> Result<ExitCode> {
    let workflow = load_config(cmd.file.as_deref())?.to_workflow()?;
    let plans = workflow.plans();

    println!("{} {}: {} run(s)", ROCKET, style(&workflow.name).bold(), plans.len());
    print_cache_key(&workflow.cache, cmd);

    for plan in &plans {
        println!("\n{}", style(plan).cyan().bold());
        let version = workflow.version_for(plan).unwrap_or_default();
        let toolchain = ToolchainHandle::new(version, format!("python{}", version));
        let context = RunContext::new(plan.clone(), toolchain, cmd.workdir.clone());

        for step in &workflow.steps {
            let note = step
                .skip_reason(&context)
                .map(|reason| format!(" {}", style(format!("(skip: {:?})", reason)).dim()))
                .unwrap_or_default();
            println!("  {:<22} {}{}", step.name, step.command(&context).display(), note);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_cache_key(policy: &CachePolicy, cmd: &PlanCommand) {
    match policy.key_for(&cmd.workdir) {
        Ok(key) => println!(
            "{} Cache key: {} (restore: {})",
            PACKAGE,
            style(&key).bold(),
            policy.restore_prefixes(&key).join(", ")
        ),
        Err(e) => println!("{} Cache key unavailable: {:#}", WARN, e),
    }
}

async fn list_cache(json: bool) -> Result<ExitCode> {
    let store = open_store(false).await?;
    let entries = store.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        println!("{} No cache entries stored", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Cache entries (newest first):", INFO);
    for entry in &entries {
        println!("  {}", format_cache_entry(entry));
    }

    Ok(ExitCode::SUCCESS)
}
