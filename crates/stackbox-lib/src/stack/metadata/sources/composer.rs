use super::{fetch_json, fixed};
use crate::stack::components::Component;
use crate::stack::installer::config::COMPOSER_BASE_URL;
use crate::stack::installer::core::traits::ComponentSource;
use crate::stack::metadata::types::{dedup_candidates, Candidate};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

const COMPOSER_FALLBACK: &[&str] = &[
    "https://getcomposer.org/download/latest-stable/composer.phar",
    "https://getcomposer.org/download/2.7.7/composer.phar",
];

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    path: String,
    version: String,
}

/// getcomposer.org `versions` document: the `stable` channel, then the
/// `2` major channel.
pub struct ComposerSource {
    base_url: String,
}

impl Default for ComposerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerSource {
    pub fn new() -> Self {
        Self {
            base_url: COMPOSER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn channel(&self, client: &Client, name: &str) -> Result<Vec<Candidate>> {
        let url = format!("{}/versions", self.base_url);
        let mut channels: HashMap<String, serde_json::Value> = fetch_json(client, &url).await?;
        let entries: Vec<ChannelEntry> = match channels.remove(name) {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("unexpected shape for channel {name}"))?,
            None => Vec::new(),
        };

        let candidates = entries
            .into_iter()
            .filter(|entry| entry.path.ends_with(".phar"))
            .map(|entry| {
                log::debug!("composer: channel {} offers {}", name, entry.version);
                Candidate::new(format!("{}{}", self.base_url, entry.path))
            })
            .collect();
        Ok(dedup_candidates(candidates))
    }
}

impl ComponentSource for ComposerSource {
    fn component(&self) -> Component {
        Component::Composer
    }

    fn primary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.channel(client, "stable"))
    }

    fn secondary<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, Result<Vec<Candidate>>> {
        Box::pin(self.channel(client, "2"))
    }

    fn fallback(&self) -> Vec<Candidate> {
        fixed(COMPOSER_FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn stable_channel_then_major_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/versions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stable": [{"path": "/download/2.7.7/composer.phar", "version": "2.7.7", "min-php": 72}],
                "preview": [{"path": "/download/2.8.0-RC1/composer.phar", "version": "2.8.0-RC1", "min-php": 72}],
                "2": [{"path": "/composer-2.phar", "version": "2.7.7", "min-php": 72}]
            })))
            .mount(&server)
            .await;

        let source = ComposerSource::new().with_base_url(server.uri());
        let client = Client::new();
        assert_eq!(
            source.primary(&client).await.unwrap(),
            vec![Candidate::new(format!("{}/download/2.7.7/composer.phar", server.uri()))]
        );
        assert_eq!(
            source.secondary(&client).await.unwrap(),
            vec![Candidate::new(format!("{}/composer-2.phar", server.uri()))]
        );
    }
}
