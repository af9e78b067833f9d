//! One discovery strategy per upstream.

pub mod apache_lounge;
pub mod composer;
pub mod github;
pub mod mariadb;
pub mod php;

use super::types::{dedup_candidates, Candidate};
use crate::stack::components::Component;
use crate::stack::installer::config::DISCOVERY_TIMEOUT;
use crate::stack::installer::core::traits::ComponentSource;
use crate::utils::version::sort_newest_first;
use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

pub use apache_lounge::ApacheLoungeSource;
pub use composer::ComposerSource;
pub use github::GitHubReleaseSource;
pub use mariadb::MariaDbSource;
pub use php::PhpSource;

/// Production strategy for `component`.
pub fn source_for(component: Component) -> Box<dyn ComponentSource> {
    match component {
        Component::Apache => Box::new(ApacheLoungeSource::httpd()),
        Component::ModFcgid => Box::new(ApacheLoungeSource::mod_fcgid()),
        Component::Php => Box::new(PhpSource::new()),
        Component::MariaDb => Box::new(MariaDbSource::new()),
        Component::Composer => Box::new(ComposerSource::new()),
        Component::Git => Box::new(GitHubReleaseSource::git_for_windows()),
    }
}

pub(crate) async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .timeout(DISCOVERY_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("{url} returned an error status"))?;
    response
        .text()
        .await
        .with_context(|| format!("failed to read body of {url}"))
}

pub(crate) async fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .timeout(DISCOVERY_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("{url} returned an error status"))?;
    response
        .json::<T>()
        .await
        .with_context(|| format!("failed to parse JSON from {url}"))
}

/// Extract every link captured by the `file` group of `pattern`, qualify it
/// against `page_url`, drop duplicates and sort newest first.
pub fn scrape_links(html: &str, page_url: &str, pattern: &Regex) -> Result<Vec<Candidate>> {
    let base = Url::parse(page_url).with_context(|| format!("invalid page URL {page_url}"))?;
    let found = pattern
        .captures_iter(html)
        .filter_map(|caps| caps.name("file"))
        .filter_map(|m| match base.join(m.as_str()) {
            Ok(url) => Some(Candidate::new(url.to_string())),
            Err(e) => {
                log::debug!("Skipping unresolvable link {}: {}", m.as_str(), e);
                None
            }
        })
        .collect();

    let mut candidates = dedup_candidates(found);
    sort_newest_first(&mut candidates, |c| c.file_name());
    Ok(candidates)
}

/// Turn fixed URLs into candidates.
pub(crate) fn fixed(urls: &[&str]) -> Vec<Candidate> {
    urls.iter().map(|url| Candidate::new(*url)).collect()
}
