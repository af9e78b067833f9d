//! Filesystem helpers shared by the archive normalizer and the config writers.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Render a path with forward slashes, the separator Apache and MariaDB
/// config grammars expect even on Windows.
pub fn forward_slashes(path: &Path) -> String {
    let simplified = dunce::simplified(path);
    simplified.to_string_lossy().replace('\\', "/")
}

/// Size of a regular file, or None when it does not exist.
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Move every entry of `src` into `dst`, merging with whatever `dst` already
/// holds. Entries of the same name are replaced.
pub fn move_dir_contents(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if to.is_dir() && from.is_dir() {
            move_dir_contents(&from, &to)?;
            let _ = fs::remove_dir(&from);
            continue;
        }
        if to.exists() {
            remove_path(&to)?;
        }

        if fs::rename(&from, &to).is_err() {
            if from.is_dir() {
                copy_dir_recursive(&from, &to)?;
            } else {
                fs::copy(&from, &to).with_context(|| {
                    format!("failed to copy {} to {}", from.display(), to.display())
                })?;
            }
            remove_path(&from)?;
        }
    }

    Ok(())
}

/// Recursive copy of a directory tree.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Find the shallowest directory under `root` (excluding `root` itself) that
/// contains `relative_marker`.
pub fn find_dir_containing(root: &Path, relative_marker: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.path().join(relative_marker).is_file())
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("failed to remove {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }
}
