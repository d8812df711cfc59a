//! Private per-run copies of the package root

use crate::core::RunPlan;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Build and tool output that is never carried into a run's copy
const SKIPPED_DIRS: [&str; 5] = [".git", ".pytest_cache", ".tox", "__pycache__", "build"];

/// Throwaway copy of the package root for one run plan, removed on drop
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Copy `source` into a fresh temporary directory named after `plan`
    pub async fn stage(source: &Path, plan: &RunPlan) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("ci-matrix-{}-", plan.slug()))
            .tempdir()
            .context("Failed to create run workspace")?;

        let from = source.to_path_buf();
        let to = dir.path().to_path_buf();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &to, &to))
            .await
            .context("Workspace copy task panicked")??;

        debug!(
            "[{}] Staged {} file(s) from {} into {}",
            plan,
            copied,
            source.display(),
            dir.path().display()
        );
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn skipped(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name) || name.ends_with(".egg-info")
}

/// Recursively copy `src` into `dst`, never descending into `root`
fn copy_tree(src: &Path, dst: &Path, root: &Path) -> Result<usize> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    let mut count = 0;
    let entries = fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))?;
    for entry in entries {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path: PathBuf = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if src_path == root || skipped(&entry.file_name().to_string_lossy()) {
                continue;
            }
            count += copy_tree(&src_path, &dst_path, root)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("Failed to copy {}", src_path.display()))?;
            count += 1;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let target = fs::read_link(&src_path)?;
                std::os::unix::fs::symlink(&target, &dst_path)
                    .with_context(|| format!("Failed to link {}", dst_path.display()))?;
                count += 1;
            }
        }
    }

    Ok(count)
}
