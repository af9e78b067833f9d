use super::{fetch_json, fetch_text, fixed, scrape_links};
use crate::stack::components::Component;
use crate::stack::installer::config::PHP_WINDOWS_BASE_URL;
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::types::{dedup_candidates, Candidate};
use crate::utils::version::sort_newest_first;
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

/// Thread-safe x64 build; the non-thread-safe zips carry an `-nts` segment.
static PHP_ZIP_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="(?P<file>[^"]*php-\d+\.\d+\.\d+-Win32-vs\d+-x64\.zip)""#)
        .expect("valid php link pattern")
});

static PHP_ZIP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^php-\d+\.\d+\.\d+-Win32-vs\d+-x64\.zip$").expect("valid php file pattern")
});

const PHP_FALLBACK: &[&str] = &[
    "https://windows.php.net/downloads/releases/php-8.3.10-Win32-vs16-x64.zip",
    "https://windows.php.net/downloads/releases/archives/php-8.3.10-Win32-vs16-x64.zip",
    "https://windows.php.net/downloads/releases/archives/php-8.2.22-Win32-vs16-x64.zip",
];

#[derive(Debug, Deserialize)]
struct BuildZip {
    path: String,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Build {
    zip: Option<BuildZip>,
}

/// windows.php.net: the `releases.json` API, then the release and archive
/// directory listings.
pub struct PhpSource {
    base_url: String,
}

impl Default for PhpSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PhpSource {
    pub fn new() -> Self {
        Self {
            base_url: PHP_WINDOWS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn releases_dir(&self) -> String {
        format!("{}/downloads/releases/", self.base_url)
    }

    async fn from_api(&self, client: &Client) -> Result<Vec<Candidate>> {
        let url = format!("{}releases.json", self.releases_dir());
        // Branch objects mix a "version" string with build objects.
        let branches: HashMap<String, HashMap<String, serde_json::Value>> =
            fetch_json(client, &url).await?;

        let mut candidates = Vec::new();
        for builds in branches.values() {
            for (key, value) in builds {
                if !(key.starts_with("ts-") && key.ends_with("-x64")) {
                    continue;
                }
                let Ok(build) = serde_json::from_value::<Build>(value.clone()) else {
                    continue;
                };
                let Some(zip) = build.zip else {
                    continue;
                };
                if !PHP_ZIP_NAME.is_match(&zip.path) {
                    continue;
                }
                candidates.push(
                    Candidate::new(format!("{}{}", self.releases_dir(), zip.path))
                        .with_sha256(zip.sha256.as_deref()),
                );
            }
        }

        let mut candidates = dedup_candidates(candidates);
        sort_newest_first(&mut candidates, |c| c.file_name());
        Ok(candidates)
    }

    async fn from_listings(&self, client: &Client) -> Result<Vec<Candidate>> {
        let pages = [
            self.releases_dir(),
            format!("{}archives/", self.releases_dir()),
        ];

        let mut found = Vec::new();
        let mut reached_any = false;
        for page in &pages {
            match fetch_text(client, page).await {
                Ok(html) => {
                    reached_any = true;
                    found.extend(scrape_links(&html, page, &PHP_ZIP_LINK)?);
                }
                Err(e) => log::debug!("php: listing {} unavailable: {:#}", page, e),
            }
        }
        if !reached_any {
            bail!("no PHP release listing was reachable");
        }

        let mut candidates = dedup_candidates(found);
        sort_newest_first(&mut candidates, |c| c.file_name());
        Ok(candidates)
    }
}

impl ComponentSource for PhpSource {
    fn component(&self) -> Component {
        Component::Php
    }

    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.from_api(client))
    }

    fn secondary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.from_listings(client))
    }

    fn fallback(&self) -> Vec<Candidate> {
        fixed(PHP_FALLBACK)
    }
}
