//! Drives the downloader across a candidate list in priority order.

use super::downloader::{Downloader, FetchOutcome};
use crate::stack::installer::types::ProgressReporter;
use crate::stack::metadata::types::Candidate;
use crate::utils::fs::file_size;
use std::path::Path;

/// Why one candidate was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    Downloaded {
        candidate: Candidate,
        bytes: u64,
        /// Candidates given up on before this one, in order.
        skipped: Vec<CandidateFailure>,
    },
    Exhausted { failures: Vec<CandidateFailure> },
}

/// Try every candidate in order until one downloads, is at least `min_size`
/// bytes and matches its published digest. Rejected artifacts are deleted
/// before moving on.
pub async fn download_first_viable(
    downloader: &mut Downloader,
    candidates: &[Candidate],
    output: &Path,
    label: &str,
    min_size: Option<u64>,
    reporter: &dyn ProgressReporter,
) -> FallbackOutcome {
    let mut failures = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        log::info!(
            "{}: trying candidate {}/{}: {}",
            label,
            index + 1,
            candidates.len(),
            candidate.url
        );

        let sha256 = match downloader.fetch(&candidate.url, output, label, reporter).await {
            FetchOutcome::Success { sha256, .. } => sha256,
            FetchOutcome::Failed { reason } => {
                failures.push(CandidateFailure {
                    url: candidate.url.clone(),
                    reason,
                });
                continue;
            }
        };

        let actual = file_size(output).unwrap_or(0);
        if let Some(min) = min_size {
            if actual < min {
                log::warn!(
                    "{}: {} is only {} bytes (need {}), trying next candidate",
                    label,
                    candidate.url,
                    actual,
                    min
                );
                discard(output).await;
                failures.push(CandidateFailure {
                    url: candidate.url.clone(),
                    reason: format!("artifact is {actual} bytes, below the {min} byte minimum"),
                });
                continue;
            }
        }

        if let Some(expected) = &candidate.sha256 {
            if !expected.eq_ignore_ascii_case(&sha256) {
                log::warn!(
                    "{}: SHA-256 mismatch for {} (expected {}, got {}), trying next candidate",
                    label,
                    candidate.url,
                    expected,
                    sha256
                );
                discard(output).await;
                failures.push(CandidateFailure {
                    url: candidate.url.clone(),
                    reason: format!("SHA-256 mismatch: expected {expected}, got {sha256}"),
                });
                continue;
            }
            log::debug!("{}: SHA-256 verified: {}", label, sha256);
        }

        return FallbackOutcome::Downloaded {
            candidate: candidate.clone(),
            bytes: actual,
            skipped: failures,
        };
    }

    log::error!(
        "{}: all {} candidate(s) failed",
        label,
        candidates.len()
    );
    FallbackOutcome::Exhausted { failures }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove rejected artifact {}: {}", path.display(), e);
    }
}
