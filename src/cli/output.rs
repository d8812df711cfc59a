//! CLI output formatting

use crate::{
    cache::{CacheEntrySummary, CacheStatus, PutOutcome},
    core::{ExecutionStatus, PipelineRun, RunStatus, StepOutcome},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "# ");

/// Create a progress bar over every step of every run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width)
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

pub fn format_run_status(status: &RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed { step, error } => format!(
            "{} at {}: {}",
            style("FAILED").red(),
            style(step).bold(),
            style(error).dim()
        ),
        RunStatus::Cancelled { step: Some(step) } => {
            format!("{} during {}", style("CANCELLED").yellow(), style(step).bold())
        }
        RunStatus::Cancelled { step: None } => style("CANCELLED").yellow().to_string(),
    }
}

pub fn format_cache_status(status: &CacheStatus) -> String {
    match status {
        CacheStatus::Hit => style("hit").green().to_string(),
        CacheStatus::Partial { matched_key } => {
            format!("{} ({})", style("partial").yellow(), style(matched_key).dim())
        }
        CacheStatus::Miss => style("miss").dim().to_string(),
    }
}

fn format_outcome(outcome: &StepOutcome) -> (Emoji<'static, 'static>, String) {
    match outcome {
        StepOutcome::Succeeded => (CHECK, String::new()),
        StepOutcome::Skipped(reason) => (SKIP, format!("skipped: {:?}", reason)),
        StepOutcome::Failed(error) => (CROSS, error.to_string()),
        StepOutcome::Cancelled => (WARN, "cancelled".to_string()),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            workflow,
            runs,
            ..
        } => format!(
            "{} Starting {} with {} run(s) ({})",
            ROCKET,
            style(workflow).bold(),
            style(runs).cyan(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::RunStarted { plan } => {
            format!("{} [{}] started", SPINNER, style(plan).cyan())
        }
        ExecutionEvent::Provisioned { plan, interpreter } => format!(
            "{} [{}] using {}",
            INFO,
            style(plan).cyan(),
            style(interpreter.display()).dim()
        ),
        ExecutionEvent::CacheRestored { plan, key, status } => format!(
            "{} [{}] cache {} for {}",
            PACKAGE,
            style(plan).cyan(),
            format_cache_status(status),
            style(key).dim()
        ),
        ExecutionEvent::StepStarted { plan, step } => {
            format!("{} [{}] {}", SPINNER, style(plan).cyan(), step)
        }
        ExecutionEvent::StepFinished { plan, step, outcome } => {
            let (icon, detail) = format_outcome(outcome);
            if detail.is_empty() {
                format!("{} [{}] {}", icon, style(plan).cyan(), style(step).green())
            } else {
                format!(
                    "{} [{}] {}: {}",
                    icon,
                    style(plan).cyan(),
                    step,
                    style(detail).dim()
                )
            }
        }
        ExecutionEvent::CacheSaved { plan, key, outcome } => {
            let verb = match outcome {
                PutOutcome::Stored => "saved",
                PutOutcome::AlreadyExists => "already saved",
            };
            format!(
                "{} [{}] cache {} as {}",
                PACKAGE,
                style(plan).cyan(),
                verb,
                style(key).dim()
            )
        }
        ExecutionEvent::RunFinished { plan, status } => {
            let icon = match status {
                RunStatus::Completed => CHECK,
                RunStatus::Failed { .. } => CROSS,
                RunStatus::Cancelled { .. } => WARN,
            };
            format!("{} [{}] {}", icon, style(plan).cyan(), format_run_status(status))
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Workflow ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// One summary line per run
pub fn format_run_summary(run: &PipelineRun) -> String {
    let cache = run
        .cache_status
        .as_ref()
        .map(format_cache_status)
        .unwrap_or_else(|| style("n/a").dim().to_string());
    format!(
        "{:<28} {} (steps: {}, cache: {})",
        run.plan.label(),
        format_run_status(&run.status),
        run.step_results.len(),
        cache
    )
}

pub fn format_cache_entry(entry: &CacheEntrySummary) -> String {
    format!(
        "{}  {}  {}",
        style(&entry.key).bold(),
        style(format_size(entry.size_bytes)).cyan(),
        style(entry.created_at.to_rfc3339()).dim()
    )
}

fn format_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let tail = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            tail
        )
    }
}
