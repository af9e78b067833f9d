use super::{fetch_json, fixed};
use crate::stack::components::Component;
use crate::stack::installer::config::{MARIADB_PREFERRED_SERIES, MARIADB_REST_API_URL};
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::types::{dedup_candidates, Candidate};
use crate::utils::version::sort_newest_first;
use anyhow::Result;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

static WINX64_ZIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^mariadb-\d+\.\d+\.\d+-winx64\.zip$").expect("valid mariadb file pattern")
});

/// How many stable series the widened query walks.
const MAX_SERIES: usize = 3;

const MARIADB_FALLBACK: &[&str] = &[
    "https://archive.mariadb.org/mariadb-11.4.3/winx64-packages/mariadb-11.4.3-winx64.zip",
    "https://archive.mariadb.org/mariadb-11.4.2/winx64-packages/mariadb-11.4.2-winx64.zip",
    "https://archive.mariadb.org/mariadb-10.11.9/winx64-packages/mariadb-10.11.9-winx64.zip",
];

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    releases: HashMap<String, ReleaseFiles>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFiles {
    #[serde(default)]
    files: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    file_name: String,
    file_download_url: String,
    checksum: Option<Checksum>,
}

#[derive(Debug, Deserialize)]
struct Checksum {
    sha256sum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    major_releases: Vec<MajorRelease>,
}

#[derive(Debug, Deserialize)]
struct MajorRelease {
    release_id: String,
    release_status: String,
    #[serde(default)]
    release_support_type: Option<String>,
}

impl MajorRelease {
    fn is_lts(&self) -> bool {
        self.release_support_type
            .as_deref()
            .is_some_and(|t| t.contains("Long Term"))
    }
}

/// MariaDB downloads REST API: latest of the preferred series, then the
/// latest of each stable series.
pub struct MariaDbSource {
    api_url: String,
    preferred_series: String,
}

impl Default for MariaDbSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MariaDbSource {
    pub fn new() -> Self {
        Self {
            api_url: MARIADB_REST_API_URL.to_string(),
            preferred_series: MARIADB_PREFERRED_SERIES.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn latest_of(&self, client: &Client, series: &str) -> Result<Vec<Candidate>> {
        let url = format!("{}/{}/latest/", self.api_url, series);
        let response: LatestResponse = fetch_json(client, &url).await?;

        let mut candidates: Vec<Candidate> = response
            .releases
            .into_values()
            .flat_map(|release| release.files)
            .filter(|file| WINX64_ZIP.is_match(&file.file_name))
            .map(|file| {
                let digest = file.checksum.and_then(|c| c.sha256sum);
                Candidate::new(file.file_download_url).with_sha256(digest.as_deref())
            })
            .collect();
        sort_newest_first(&mut candidates, |c| c.file_name());
        Ok(candidates)
    }

    async fn from_stable_series(&self, client: &Client) -> Result<Vec<Candidate>> {
        let url = format!("{}/", self.api_url);
        let response: SeriesResponse = fetch_json(client, &url).await?;

        let mut series: Vec<MajorRelease> = response
            .major_releases
            .into_iter()
            .filter(|r| r.release_status.eq_ignore_ascii_case("Stable"))
            .collect();
        series.sort_by_key(|r| !r.is_lts());

        let mut candidates = Vec::new();
        for release in series.iter().take(MAX_SERIES) {
            match self.latest_of(client, &release.release_id).await {
                Ok(found) => candidates.extend(found),
                Err(e) => log::debug!("mariadb: series {} unavailable: {:#}", release.release_id, e),
            }
        }
        Ok(dedup_candidates(candidates))
    }
}

impl ComponentSource for MariaDbSource {
    fn component(&self) -> Component {
        Component::MariaDb
    }

    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.latest_of(client, &self.preferred_series))
    }

    fn secondary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.from_stable_series(client))
    }

    fn fallback(&self) -> Vec<Candidate> {
        fixed(MARIADB_FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn latest_body(version: &str, digest: &str) -> serde_json::Value {
        json!({
            "releases": {
                version: {
                    "release_name": format!("MariaDB Server {version}"),
                    "files": [
                        {
                            "file_name": format!("mariadb-{version}-winx64.msi"),
                            "file_download_url": format!("https://dl.example/mariadb-{version}-winx64.msi"),
                            "checksum": {"sha256sum": digest}
                        },
                        {
                            "file_name": format!("mariadb-{version}-winx64.zip"),
                            "file_download_url": format!("https://dl.example/mariadb-{version}-winx64.zip"),
                            "checksum": {"sha256sum": digest}
                        },
                        {
                            "file_name": format!("mariadb-{version}-linux-systemd-x86_64.tar.gz"),
                            "file_download_url": "https://dl.example/linux.tar.gz",
                            "checksum": null
                        }
                    ]
                }
            }
        })
    }

    #[tokio::test]
    async fn preferred_series_zip_only() {
        let server = MockServer::start().await;
        let digest = "b".repeat(64);
        Mock::given(method("GET"))
            .and(path("/mariadb/11.4/latest/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(latest_body("11.4.3", &digest)))
            .mount(&server)
            .await;

        let source = MariaDbSource::new().with_api_url(format!("{}/mariadb", server.uri()));
        let found = source.primary(&Client::new()).await.unwrap();
        assert_eq!(
            found,
            vec![Candidate::new("https://dl.example/mariadb-11.4.3-winx64.zip")
                .with_sha256(Some(&digest))]
        );
    }

    #[tokio::test]
    async fn stable_series_prefer_long_term_support() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mariadb/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "major_releases": [
                    {"release_id": "11.6", "release_status": "RC", "release_support_type": "Short Term Support"},
                    {"release_id": "11.5", "release_status": "Stable", "release_support_type": "Short Term Support"},
                    {"release_id": "10.11", "release_status": "Stable", "release_support_type": "Long Term Support"}
                ]
            })))
            .mount(&server)
            .await;
        for (series, version) in [("11.5", "11.5.2"), ("10.11", "10.11.9")] {
            Mock::given(method("GET"))
                .and(path(format!("/mariadb/{series}/latest/")))
                .respond_with(ResponseTemplate::new(200).set_body_json(latest_body(version, "")))
                .mount(&server)
                .await;
        }

        let source = MariaDbSource::new().with_api_url(format!("{}/mariadb", server.uri()));
        let found = source.secondary(&Client::new()).await.unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.file_name()).collect();
        assert_eq!(
            names,
            vec!["mariadb-10.11.9-winx64.zip", "mariadb-11.5.2-winx64.zip"]
        );
        assert_eq!(found[0].sha256, None);
    }
}
