pub mod config;
pub mod core;
pub mod types;


use crate::stack::components::Component;
use crate::stack::installer::core::archive::normalize;
use crate::stack::installer::core::downloader::{DownloadStats, Downloader, FetchOptions};
use crate::stack::installer::core::fallback::{
    download_first_viable, CandidateFailure, FallbackOutcome,
};
use crate::stack::installer::core::manual::ManualAcquisition;
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::cache::LocationCache;
use crate::stack::metadata::discovery::Discoverer;
use crate::stack::metadata::sources::source_for;
use crate::stack::metadata::types::Candidate;
use crate::stack::paths::StackPaths;
use crate::utils::fs::file_size;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use types::{ProgressReporter, StackError};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Read the resolved-location cache before discovering.
    pub use_cache: bool,
    pub fetch: FetchOptions,
}

/// Where the installed artifact came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// A complete artifact from an earlier run was already in `downloads/`.
    Reused,
    Downloaded(Candidate),
    Manual(PathBuf),
}

#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    AlreadyInstalled,
    Installed { source: ArtifactSource },
    /// Every candidate failed; the caller decides how to involve the operator.
    NeedsManualIntervention(ManualAcquisition),
}

/// Runs one component at a time through discover, fetch and normalize.
pub struct StackInstaller {
    paths: StackPaths,
    downloader: Downloader,
    discoverer: Discoverer,
}

impl StackInstaller {
    pub async fn new(paths: StackPaths, client: Client, options: InstallOptions) -> Self {
        let cache = LocationCache::load(paths.location_cache_file()).await;
        let discoverer = Discoverer::new(client.clone(), cache, options.use_cache);
        Self {
            paths,
            downloader: Downloader::new(client, options.fetch),
            discoverer,
        }
    }

    pub fn with_discoverer(mut self, discoverer: Discoverer) -> Self {
        self.discoverer = discoverer;
        self
    }

    pub fn paths(&self) -> &StackPaths {
        &self.paths
    }

    pub fn stats(&self) -> &DownloadStats {
        self.downloader.stats()
    }

    pub async fn ensure_component(
        &mut self,
        component: Component,
        reporter: &dyn ProgressReporter,
    ) -> Result<AcquireOutcome> {
        let source = source_for(component);
        self.ensure_with_source(source.as_ref(), reporter).await
    }

    /// Install `source`'s component unless its marker already exists.
    pub async fn ensure_with_source(
        &mut self,
        source: &dyn ComponentSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<AcquireOutcome> {
        let component = source.component();
        if self.paths.is_installed(component) {
            log::info!(
                "{} already installed ({})",
                component.display_name(),
                self.paths.marker_path(component).display()
            );
            return Ok(AcquireOutcome::AlreadyInstalled);
        }

        let artifact = self.paths.artifact_path(component);
        let min_size = component.min_size();

        if file_size(&artifact).is_some_and(|size| size >= min_size) {
            log::info!("Reusing {} from an earlier run", artifact.display());
            match self.install_artifact(component, &artifact, reporter).await {
                Ok(()) => {
                    return Ok(AcquireOutcome::Installed {
                        source: ArtifactSource::Reused,
                    })
                }
                Err(e) => {
                    log::warn!(
                        "Existing {} is unusable ({:#}), downloading again",
                        artifact.display(),
                        e
                    );
                    remove_artifact(&artifact).await;
                }
            }
        }

        reporter.set_message(&format!("Locating {}", component.display_name()));
        let cached = self.discoverer.cached(component).map(str::to_string);
        let candidates = self.discoverer.discover(source, Some(min_size)).await;

        let mut failures: Vec<CandidateFailure> = Vec::new();
        if let Some(candidate) = self
            .install_first(component, &candidates, &mut failures, reporter)
            .await
        {
            return Ok(self.installed_from(component, candidate).await);
        }

        if let Some(stale) = cached {
            log::warn!(
                "{}: cached location {} failed, discovering again",
                component.display_name(),
                stale
            );
            self.discoverer.forget(component).await;
            let fresh: Vec<Candidate> = self
                .discoverer
                .rediscover(source, Some(min_size))
                .await
                .into_iter()
                .filter(|c| c.url != stale)
                .collect();
            if let Some(candidate) = self
                .install_first(component, &fresh, &mut failures, reporter)
                .await
            {
                return Ok(self.installed_from(component, candidate).await);
            }
        }

        self.discoverer.forget(component).await;
        log::error!(
            "{}: no candidate could be installed, manual download required",
            component.display_name()
        );
        Ok(AcquireOutcome::NeedsManualIntervention(
            ManualAcquisition::for_component(component, &self.paths, failures),
        ))
    }

    /// Download and install candidates in order until one installs. Every
    /// rejected candidate is appended to `failures`.
    async fn install_first(
        &mut self,
        component: Component,
        candidates: &[Candidate],
        failures: &mut Vec<CandidateFailure>,
        reporter: &dyn ProgressReporter,
    ) -> Option<Candidate> {
        let artifact = self.paths.artifact_path(component);
        let min_size = component.min_size();
        let mut remaining = candidates;
        while !remaining.is_empty() {
            let outcome = download_first_viable(
                &mut self.downloader,
                remaining,
                &artifact,
                component.display_name(),
                Some(min_size),
                reporter,
            )
            .await;

            let candidate = match outcome {
                FallbackOutcome::Downloaded {
                    candidate, skipped, ..
                } => {
                    failures.extend(skipped);
                    candidate
                }
                FallbackOutcome::Exhausted { failures: rest } => {
                    failures.extend(rest);
                    return None;
                }
            };
            let next = remaining
                .iter()
                .position(|c| c.url == candidate.url)
                .map_or(remaining.len(), |i| i + 1);
            remaining = &remaining[next..];

            match self.install_artifact(component, &artifact, reporter).await {
                Ok(()) => return Some(candidate),
                Err(e) => {
                    log::warn!(
                        "{} from {} could not be installed: {:#}",
                        component.display_name(),
                        candidate.url,
                        e
                    );
                    remove_artifact(&artifact).await;
                    failures.push(CandidateFailure {
                        url: candidate.url,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        None
    }

    /// The installed URL is the one worth caching, not merely the first that
    /// answered a probe.
    async fn installed_from(
        &mut self,
        component: Component,
        candidate: Candidate,
    ) -> AcquireOutcome {
        self.discoverer.remember(component, &candidate.url).await;
        AcquireOutcome::Installed {
            source: ArtifactSource::Downloaded(candidate),
        }
    }

    /// Install from a file the operator provided. The file is first copied to
    /// the component's artifact path unless it already lives there.
    pub async fn complete_manual(
        &mut self,
        manual: &ManualAcquisition,
        file: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<AcquireOutcome> {
        let component = manual.component;
        let actual = file_size(file).unwrap_or(0);
        if actual < manual.min_size {
            return Err(StackError::Undersized {
                path: file.to_path_buf(),
                actual,
                minimum: manual.min_size,
            }
            .into());
        }

        if file != manual.destination {
            if let Some(parent) = manual.destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(file, &manual.destination)
                .await
                .with_context(|| {
                    format!(
                        "failed to copy {} to {}",
                        file.display(),
                        manual.destination.display()
                    )
                })?;
        }

        if let Err(e) = self
            .install_artifact(component, &manual.destination, reporter)
            .await
        {
            // A rejected copy left at the destination would win every rescan.
            remove_artifact(&manual.destination).await;
            return Err(e);
        }
        Ok(AcquireOutcome::Installed {
            source: ArtifactSource::Manual(file.to_path_buf()),
        })
    }

    async fn install_artifact(
        &self,
        component: Component,
        artifact: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        reporter.start_step(&format!("Installing {}", component.display_name()));
        let result = normalize(
            component,
            component.artifact_kind(),
            artifact,
            &self.paths.install_dir(component),
        )
        .await;
        match &result {
            Ok(marker) => {
                log::info!(
                    "{} installed ({})",
                    component.display_name(),
                    marker.display()
                );
                reporter.done(true, None);
            }
            Err(e) => reporter.done(false, Some(&format!("{e:#}"))),
        }
        result.map(|_| ())
    }
}

async fn remove_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove {}: {}", path.display(), e);
    }
}
