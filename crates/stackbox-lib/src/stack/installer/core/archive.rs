//! Archive extraction and layout normalization.
//!
//! Every component must end up as `<install dir>/<its own top level>`
//! (`bin/`, `lib/`, ...) whatever wrapping folder the upstream zip used.

use crate::stack::components::{ArtifactKind, Component};
use crate::stack::installer::config::SELF_EXTRACT_TIMEOUT;
use crate::stack::installer::types::StackError;
use crate::utils::fs::{find_dir_containing, move_dir_contents};
use crate::utils::process::run_process;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Extract `archive` into `dest` according to `kind`, then make sure the
/// component's marker exists, hoisting a nested directory once if it does not.
pub async fn normalize(
    component: Component,
    kind: ArtifactKind,
    archive: &Path,
    dest: &Path,
) -> Result<PathBuf> {
    log::info!(
        "Extracting {} into {}",
        archive.display(),
        dest.display()
    );

    match kind {
        ArtifactKind::Zip { strip_wrapper } => extract_zip(archive, dest, strip_wrapper)
            .await
            .map_err(|e| extraction_failed(component, e))?,
        ArtifactKind::SelfExtracting => run_self_extractor(component, archive, dest).await?,
        ArtifactKind::Raw => install_raw(archive, &dest.join(component.marker())).await?,
    }

    let marker = component.marker();
    let expected = dest.join(marker);
    if expected.is_file() {
        return Ok(expected);
    }

    log::warn!(
        "{} not found after extraction, searching for a nested layout",
        expected.display()
    );
    if let Some(nested) = find_dir_containing(dest, marker) {
        log::info!("Hoisting {} into {}", nested.display(), dest.display());
        hoist_nested(&nested, dest)?;
    }

    if expected.is_file() {
        Ok(expected)
    } else {
        Err(StackError::MarkerMissing {
            component,
            marker: expected,
        }
        .into())
    }
}

fn extraction_failed(component: Component, e: anyhow::Error) -> anyhow::Error {
    if e.is::<StackError>() {
        return e;
    }
    StackError::ExtractionFailed {
        component,
        reason: format!("{e:#}"),
    }
    .into()
}

/// Extract a zip. With `strip_wrapper`, extraction goes through a scratch
/// directory and a single top-level folder is dissolved.
pub async fn extract_zip(archive: &Path, dest: &Path, strip_wrapper: bool) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        fs::create_dir_all(&dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        if !strip_wrapper {
            extract_zip_blocking(&archive, &dest)?;
            return Ok(());
        }

        let scratch_parent = dest.parent().unwrap_or(&dest);
        let scratch = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(scratch_parent)
            .with_context(|| format!("failed to create scratch dir in {}", scratch_parent.display()))?;
        extract_zip_blocking(&archive, scratch.path())?;
        hoist_single_wrapper(scratch.path(), &dest)
    })
    .await
    .context("zip extraction task panicked")?
}

/// Returns the number of files written.
fn extract_zip_blocking(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("failed to open {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", archive_path.display()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(StackError::UnsafeArchiveEntry {
                entry: entry.name().to_string(),
            }
            .into());
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)
            .with_context(|| format!("failed to create {}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    log::debug!("Extracted {} files from {}", written, archive_path.display());
    Ok(written)
}

/// Move the scratch contents into `dest`. When the scratch holds exactly one
/// directory and nothing else, that directory's contents are moved instead.
pub fn hoist_single_wrapper(scratch: &Path, dest: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(scratch)
        .with_context(|| format!("failed to read {}", scratch.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();

    match entries.as_slice() {
        [single] if single.is_dir() => {
            log::debug!("Stripping wrapper folder {:?}", single.file_name());
            move_dir_contents(single, dest)
        }
        _ => move_dir_contents(scratch, dest),
    }
}

/// Move a nested directory's contents up into `dest` and remove the now
/// empty chain of directories left behind.
fn hoist_nested(nested: &Path, dest: &Path) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix(".hoist-")
        .tempdir_in(dest)
        .with_context(|| format!("failed to create staging dir in {}", dest.display()))?;
    move_dir_contents(nested, staging.path())?;

    let mut current = nested.to_path_buf();
    while current != dest && current.starts_with(dest) {
        if fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    move_dir_contents(staging.path(), dest)
}

/// Run a 7-Zip self-extractor non-interactively into `dest`.
async fn run_self_extractor(component: Component, exe: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let output_flag = format!("-o{}", dest.display());
    let result = run_process(exe, [output_flag.as_str(), "-y"], None, SELF_EXTRACT_TIMEOUT).await;
    if result.success() {
        Ok(())
    } else {
        Err(StackError::ExtractionFailed {
            component,
            reason: result.describe(),
        }
        .into())
    }
}

async fn install_raw(artifact: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::copy(artifact, target)
        .await
        .with_context(|| format!("failed to copy {} to {}", artifact.display(), target.display()))?;
    Ok(())
}
