use super::fixed;
use crate::stack::components::Component;
use crate::stack::installer::config::{DISCOVERY_TIMEOUT, GITHUB_API_URL, GIT_FOR_WINDOWS_REPO};
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::types::{dedup_candidates, Candidate};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static PORTABLE_GIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PortableGit-\d+\.\d+\.\d+(?:\.\d+)?-64-bit\.7z\.exe$")
        .expect("valid PortableGit pattern")
});

const RELEASE_PAGE_SIZE: u32 = 10;

const GIT_FALLBACK: &[&str] = &[
    "https://github.com/git-for-windows/git/releases/download/v2.46.0.windows.1/PortableGit-2.46.0-64-bit.7z.exe",
    "https://github.com/git-for-windows/git/releases/download/v2.45.2.windows.1/PortableGit-2.45.2-64-bit.7z.exe",
];

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
    /// `sha256:<hex>` on releases published after mid-2025.
    digest: Option<String>,
}

/// GitHub releases API for a repository publishing a portable build.
pub struct GitHubReleaseSource {
    component: Component,
    api_url: String,
    repo: String,
    asset_pattern: &'static Lazy<Regex>,
    fallback: &'static [&'static str],
}

impl GitHubReleaseSource {
    pub fn git_for_windows() -> Self {
        Self {
            component: Component::Git,
            api_url: GITHUB_API_URL.to_string(),
            repo: GIT_FOR_WINDOWS_REPO.to_string(),
            asset_pattern: &PORTABLE_GIT,
            fallback: GIT_FALLBACK,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, client: &Client, url: &str) -> Result<T> {
        client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?
            .json::<T>()
            .await
            .with_context(|| format!("failed to parse JSON from {url}"))
    }

    fn matching_assets(&self, release: Release) -> Vec<Candidate> {
        if release.draft || release.prerelease {
            log::debug!("{}: skipping unpublished release {}", self.component, release.tag_name);
            return Vec::new();
        }
        release
            .assets
            .into_iter()
            .filter(|asset| self.asset_pattern.is_match(&asset.name))
            .map(|asset| {
                Candidate::new(asset.browser_download_url).with_sha256(asset.digest.as_deref())
            })
            .collect()
    }

    async fn latest(&self, client: &Client) -> Result<Vec<Candidate>> {
        let url = format!("{}/repos/{}/releases/latest", self.api_url, self.repo);
        let release: Release = self.get(client, &url).await?;
        Ok(self.matching_assets(release))
    }

    async fn recent(&self, client: &Client) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/repos/{}/releases?per_page={}",
            self.api_url, self.repo, RELEASE_PAGE_SIZE
        );
        let releases: Vec<Release> = self.get(client, &url).await?;
        // The API lists newest first.
        let candidates = releases
            .into_iter()
            .flat_map(|release| self.matching_assets(release))
            .collect();
        Ok(dedup_candidates(candidates))
    }
}

impl ComponentSource for GitHubReleaseSource {
    fn component(&self) -> Component {
        self.component
    }

    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.latest(client))
    }

    fn secondary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.recent(client))
    }

    fn fallback(&self) -> Vec<Candidate> {
        fixed(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn latest_without_matching_asset_widens_to_recent_releases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/git-for-windows/git/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": "v2.47.0.windows.1",
                "draft": false,
                "prerelease": false,
                "assets": [{"name": "Git-2.47.0-64-bit.exe", "browser_download_url": "https://dl.example/Git-2.47.0-64-bit.exe"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/git-for-windows/git/releases"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "tag_name": "v2.48.0-rc1.windows.1",
                    "prerelease": true,
                    "assets": [{"name": "PortableGit-2.48.0-rc1-64-bit.7z.exe", "browser_download_url": "https://dl.example/rc.7z.exe"}]
                },
                {
                    "tag_name": "v2.46.2.windows.1",
                    "assets": [
                        {"name": "PortableGit-2.46.2-32-bit.7z.exe", "browser_download_url": "https://dl.example/32.7z.exe"},
                        {"name": "PortableGit-2.46.2-64-bit.7z.exe", "browser_download_url": "https://dl.example/PortableGit-2.46.2-64-bit.7z.exe"}
                    ]
                }
            ])))
            .mount(&server)
            .await;

        let source = GitHubReleaseSource::git_for_windows().with_api_url(server.uri());
        let client = Client::new();
        assert!(source.primary(&client).await.unwrap().is_empty());
        assert_eq!(
            source.secondary(&client).await.unwrap(),
            vec![Candidate::new("https://dl.example/PortableGit-2.46.2-64-bit.7z.exe")]
        );
    }
}
