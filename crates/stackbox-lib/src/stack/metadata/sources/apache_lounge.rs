use super::{fetch_text, fixed, scrape_links};
use crate::stack::components::Component;
use crate::stack::installer::config::APACHE_LOUNGE_DOWNLOAD_URL;
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::types::Candidate;
use anyhow::Result;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;

static HTTPD_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="(?P<file>[^"]*httpd-\d+\.\d+\.\d+(?:-\d+)?-[Ww]in64-VS\d+\.zip)""#)
        .expect("valid httpd link pattern")
});

static MOD_FCGID_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="(?P<file>[^"]*mod_fcgid-\d+\.\d+(?:\.\d+)?-[Ww]in64-VS\d+\.zip)""#)
        .expect("valid mod_fcgid link pattern")
});

const HTTPD_FALLBACK: &[&str] = &[
    "https://www.apachelounge.com/download/VS17/binaries/httpd-2.4.62-240904-win64-VS17.zip",
    "https://www.apachelounge.com/download/VS17/binaries/httpd-2.4.61-240703-win64-VS17.zip",
];

const MOD_FCGID_FALLBACK: &[&str] = &[
    "https://www.apachelounge.com/download/VS17/modules/mod_fcgid-2.3.10-win64-VS17.zip",
];

/// Apache Lounge download page, scraped for either the server or the
/// FastCGI module.
pub struct ApacheLoungeSource {
    component: Component,
    page_url: String,
    pattern: &'static Lazy<Regex>,
    fallback: &'static [&'static str],
}

impl ApacheLoungeSource {
    pub fn httpd() -> Self {
        Self {
            component: Component::Apache,
            page_url: APACHE_LOUNGE_DOWNLOAD_URL.to_string(),
            pattern: &HTTPD_LINK,
            fallback: HTTPD_FALLBACK,
        }
    }

    pub fn mod_fcgid() -> Self {
        Self {
            component: Component::ModFcgid,
            page_url: APACHE_LOUNGE_DOWNLOAD_URL.to_string(),
            pattern: &MOD_FCGID_LINK,
            fallback: MOD_FCGID_FALLBACK,
        }
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = url.into();
        self
    }

    async fn scrape(&self, client: &Client) -> Result<Vec<Candidate>> {
        let html = fetch_text(client, &self.page_url).await?;
        let candidates = scrape_links(&html, &self.page_url, self.pattern)?;
        log::debug!(
            "{}: {} link(s) on {}",
            self.component,
            candidates.len(),
            self.page_url
        );
        Ok(candidates)
    }
}

impl ComponentSource for ApacheLoungeSource {
    fn component(&self) -> Component {
        self.component
    }

    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.scrape(client))
    }

    fn fallback(&self) -> Vec<Candidate> {
        fixed(self.fallback)
    }
}
