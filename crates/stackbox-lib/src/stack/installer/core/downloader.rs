use crate::stack::installer::config::{
    DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, DOWNLOAD_TIMEOUT, MIN_ARTIFACT_BYTES,
};
use crate::stack::installer::types::ProgressReporter;
use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

/// Retry policy for a single artifact download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Whole-request timeout for one attempt, body included.
    pub timeout: Duration,
    /// Total number of attempts.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DOWNLOAD_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Aggregate over every `fetch` call made by one `Downloader`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        bytes: u64,
        duration: Duration,
        /// Lowercase hex digest of the promoted file.
        sha256: String,
    },
    Failed {
        reason: String,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Resilient fetcher: bounded retries, `<output>.tmp` staging, size floor,
/// atomic promotion.
pub struct Downloader {
    client: Client,
    options: FetchOptions,
    stats: DownloadStats,
}

impl Downloader {
    pub fn new(client: Client, options: FetchOptions) -> Self {
        Self {
            client,
            options,
            stats: DownloadStats::default(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Download `url` to `output`, retrying up to `options.retries` times.
    /// Nothing is written at `output` unless a complete body of at least
    /// `MIN_ARTIFACT_BYTES` arrived.
    pub async fn fetch(
        &mut self,
        url: &str,
        output: &Path,
        label: &str,
        reporter: &dyn ProgressReporter,
    ) -> FetchOutcome {
        self.stats.attempted += 1;
        let started = Instant::now();
        let tmp_path = temp_path_for(output);
        let attempts = self.options.retries.max(1);

        if let Some(parent) = output.parent() {
            if let Err(e) = create_dir_all(parent).await {
                self.stats.failed += 1;
                return FetchOutcome::Failed {
                    reason: format!("cannot create {}: {e}", parent.display()),
                };
            }
        }

        reporter.start_step(label);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let _ = tokio::fs::remove_file(&tmp_path).await;

            match download_once(&self.client, url, &tmp_path, output, self.options.timeout, reporter).await {
                Ok((bytes, sha256)) => {
                    let duration = started.elapsed();
                    self.stats.succeeded += 1;
                    self.stats.bytes += bytes;
                    self.stats.elapsed += duration;
                    log::info!(
                        "Downloaded {}: {} bytes in {:.2}s ({})",
                        label,
                        bytes,
                        duration.as_secs_f64(),
                        url
                    );
                    reporter.done(true, None);
                    return FetchOutcome::Success {
                        bytes,
                        duration,
                        sha256,
                    };
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    if attempt >= attempts {
                        self.stats.failed += 1;
                        self.stats.elapsed += started.elapsed();
                        log::error!(
                            "Download of {} failed after {} attempts: {:#}",
                            label,
                            attempts,
                            e
                        );
                        let reason = format!("{e:#}");
                        reporter.done(false, Some(&reason));
                        return FetchOutcome::Failed { reason };
                    }
                    log::warn!(
                        "Download of {} failed (attempt {}/{}): {:#}. Retrying in {}s...",
                        label,
                        attempt,
                        attempts,
                        e,
                        self.options.retry_delay.as_secs_f64()
                    );
                    reporter.set_message(&format!("Retrying {label} ({attempt}/{attempts})"));
                    tokio::time::sleep(self.options.retry_delay).await;
                }
            }
        }
    }
}

/// `<output>.tmp` next to the final path.
pub fn temp_path_for(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    output.with_file_name(format!("{name}.tmp"))
}

async fn download_once(
    client: &Client,
    url: &str,
    tmp_path: &Path,
    output: &Path,
    timeout: Duration,
    reporter: &dyn ProgressReporter,
) -> Result<(u64, String)> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error {}: {}", response.status(), url);
    }

    let total_size = response.content_length();
    log::debug!("Download size: {:?} bytes", total_size);

    let mut file = File::create(tmp_path)
        .await
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    let mut downloaded: u64 = 0;
    let mut hasher = Sha256::new();

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.with_context(|| format!("body of {url} interrupted"))?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        reporter.update_bytes(downloaded, total_size);
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let on_disk = tokio::fs::metadata(tmp_path)
        .await
        .map(|m| m.len())
        .with_context(|| format!("{} vanished after download", tmp_path.display()))?;
    if on_disk < MIN_ARTIFACT_BYTES {
        anyhow::bail!(
            "downloaded {} bytes from {}, below the {} byte floor",
            on_disk,
            url,
            MIN_ARTIFACT_BYTES
        );
    }

    tokio::fs::rename(tmp_path, output)
        .await
        .with_context(|| format!("failed to move download into {}", output.display()))?;

    Ok((on_disk, format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::installer::types::SilentProgressReporter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(500),
            retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn promotes_complete_download_and_removes_temp() {
        let server = MockServer::start().await;
        let body = vec![7u8; 4096];
        Mock::given(method("GET"))
            .and(path("/pkg.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("downloads").join("pkg.zip");
        let mut downloader = Downloader::new(Client::new(), quick_options());
        let outcome = downloader
            .fetch(
                &format!("{}/pkg.zip", server.uri()),
                &output,
                "pkg",
                &SilentProgressReporter,
            )
            .await;

        match outcome {
            FetchOutcome::Success { bytes, sha256, .. } => {
                assert_eq!(bytes, 4096);
                assert_eq!(sha256, format!("{:x}", Sha256::digest(&body)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(std::fs::read(&output).unwrap(), body);
        assert!(!temp_path_for(&output).exists());
        assert_eq!(downloader.stats().succeeded, 1);
        assert_eq!(downloader.stats().bytes, 4096);
    }

    #[tokio::test]
    async fn rejects_body_one_byte_below_floor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tiny.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 999]))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("tiny.zip");
        let mut downloader = Downloader::new(Client::new(), quick_options());
        let outcome = downloader
            .fetch(
                &format!("{}/tiny.zip", server.uri()),
                &output,
                "tiny",
                &SilentProgressReporter,
            )
            .await;

        assert!(!outcome.is_success());
        assert!(!output.exists());
        assert!(!temp_path_for(&output).exists());
        assert_eq!(downloader.stats().attempted, 1);
        assert_eq!(downloader.stats().failed, 1);
        assert_eq!(downloader.stats().succeeded, 0);
    }

    #[tokio::test]
    async fn floor_is_inclusive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exact.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1000]))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("exact.zip");
        let mut downloader = Downloader::new(Client::new(), quick_options());
        let outcome = downloader
            .fetch(
                &format!("{}/exact.zip", server.uri()),
                &output,
                "exact",
                &SilentProgressReporter,
            )
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn survives_two_timeouts_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.zip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![2u8; 2048])
                    .set_delay(Duration::from_secs(5)),
            )
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 2048]))
            .with_priority(2)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("slow.zip");
        let mut downloader = Downloader::new(Client::new(), quick_options());
        let outcome = downloader
            .fetch(
                &format!("{}/slow.zip", server.uri()),
                &output,
                "slow",
                &SilentProgressReporter,
            )
            .await;

        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(downloader.stats().attempted, 1);
        assert_eq!(downloader.stats().succeeded, 1);
        assert_eq!(downloader.stats().failed, 0);
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn http_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.zip"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("broken.zip");
        let mut downloader = Downloader::new(Client::new(), quick_options());
        let outcome = downloader
            .fetch(
                &format!("{}/broken.zip", server.uri()),
                &output,
                "broken",
                &SilentProgressReporter,
            )
            .await;

        match outcome {
            FetchOutcome::Failed { reason } => assert!(reason.contains("503"), "{reason}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(downloader.stats().failed, 1);
    }
}
