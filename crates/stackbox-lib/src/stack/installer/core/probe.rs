//! Reachability probing: a HEAD request that never downloads the body.

use crate::stack::metadata::types::Candidate;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    /// 2xx or 3xx after redirects were followed.
    pub accessible: bool,
    /// Kept for diagnostics even when the status is 4xx/5xx.
    pub status: Option<u16>,
    /// Declared `Content-Length`, None when the server did not send one.
    pub content_length: Option<u64>,
    /// Transport error, if the request never produced a status.
    pub error: Option<String>,
}

impl ProbeResult {
    /// An unknown length is accepted; only a declared length below the
    /// minimum disqualifies.
    pub fn meets_minimum(&self, min_size: Option<u64>) -> bool {
        match (min_size, self.content_length) {
            (None, _) | (_, None) => true,
            (Some(min), Some(len)) => len >= min,
        }
    }

    pub fn is_viable(&self, min_size: Option<u64>) -> bool {
        self.accessible && self.meets_minimum(min_size)
    }
}

/// Issue a HEAD request with redirect following.
pub async fn probe_url(client: &Client, url: &str, timeout: Duration) -> ProbeResult {
    match client.head(url).timeout(timeout).send().await {
        Ok(response) => {
            let status = response.status();
            // reqwest reports the (empty) HEAD body size from content_length(),
            // so read the declared header instead.
            let content_length = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let accessible = status.is_success() || status.is_redirection();
            log::debug!(
                "Probe {} -> {} (length {:?})",
                url,
                status.as_u16(),
                content_length
            );
            ProbeResult {
                url: url.to_string(),
                accessible,
                status: Some(status.as_u16()),
                content_length,
                error: None,
            }
        }
        Err(e) => {
            log::debug!("Probe {} failed: {}", url, e);
            ProbeResult {
                url: url.to_string(),
                accessible: false,
                status: e.status().map(|s| s.as_u16()),
                content_length: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Probe candidates in priority order and return the first one that is
/// reachable and not declared smaller than `min_size`.
pub async fn find_working_url<'a>(
    client: &Client,
    candidates: &'a [Candidate],
    min_size: Option<u64>,
    timeout: Duration,
) -> Option<&'a Candidate> {
    for candidate in candidates {
        let probe = probe_url(client, &candidate.url, timeout).await;
        if probe.is_viable(min_size) {
            return Some(candidate);
        }
        if probe.accessible {
            log::debug!(
                "Skipping {}: declared {:?} bytes, need {:?}",
                candidate.url,
                probe.content_length,
                min_size
            );
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result(accessible: bool, len: Option<u64>) -> ProbeResult {
        ProbeResult {
            url: "https://example.invalid/a.zip".into(),
            accessible,
            status: Some(if accessible { 200 } else { 404 }),
            content_length: len,
            error: None,
        }
    }

    #[test]
    fn unknown_length_is_optimistic() {
        assert!(result(true, None).is_viable(Some(5_000_000)));
        assert!(result(true, Some(10)).is_viable(None));
        assert!(!result(true, Some(10)).is_viable(Some(11)));
        assert!(result(true, Some(11)).is_viable(Some(11)));
        assert!(!result(false, None).is_viable(None));
    }

    #[tokio::test]
    async fn keeps_error_status_for_diagnostics() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let probe = probe_url(
            &client,
            &format!("{}/missing.zip", server.uri()),
            Duration::from_secs(5),
        )
        .await;
        assert!(!probe.accessible);
        assert_eq!(probe.status, Some(404));
    }

    #[tokio::test]
    async fn transport_error_is_not_accessible() {
        let client = Client::new();
        let probe = probe_url(&client, "http://127.0.0.1:1/nothing.zip", Duration::from_secs(2)).await;
        assert!(!probe.accessible);
        assert!(probe.error.is_some());
    }

    #[tokio::test]
    async fn first_reachable_candidate_wins() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.zip"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/ok.zip"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/also-ok.zip"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let candidates = vec![
            Candidate::new(format!("{}/gone.zip", server.uri())),
            Candidate::new(format!("{}/ok.zip", server.uri())),
            Candidate::new(format!("{}/also-ok.zip", server.uri())),
        ];
        let client = Client::new();
        let found = find_working_url(&client, &candidates, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, &candidates[1]);
    }
}
