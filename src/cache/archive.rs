//! Packing a cache directory into an opaque payload

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct ArchivedFile {
    /// `/`-separated path relative to the archive root
    path: String,
    contents: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Archive {
    files: Vec<ArchivedFile>,
}

/// Pack every regular file under `dir`. A missing directory packs to an empty archive.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    let mut archive = Archive::default();
    if dir.is_dir() {
        collect(dir, dir, &mut archive.files)?;
    }
    archive.files.sort_by(|a, b| a.path.cmp(&b.path));
    serde_json::to_vec(&archive).context("Failed to encode cache archive")
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<ArchivedFile>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect(root, &path, files)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} escapes {}", path.display(), root.display()))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let contents =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            files.push(ArchivedFile {
                path: relative,
                contents,
            });
        }
    }
    Ok(())
}

/// Unpack a payload into `dir`, returning the number of files written.
/// An empty payload restores nothing.
pub fn unpack_into(payload: &[u8], dir: &Path) -> Result<usize> {
    if payload.is_empty() {
        return Ok(0);
    }

    let archive: Archive =
        serde_json::from_slice(payload).context("Failed to decode cache archive")?;

    for file in &archive.files {
        let target = dir.join(safe_relative(&file.path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, &file.contents)
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }

    Ok(archive.files.len())
}

fn safe_relative(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        bail!("Refusing to restore unsafe cache path '{}'", path);
    }
    Ok(candidate.to_path_buf())
}
