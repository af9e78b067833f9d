//! Tiered candidate discovery: cache, primary, secondary, hardcoded fallback.

use super::cache::LocationCache;
use super::types::{dedup_candidates, Candidate};
use crate::stack::components::Component;
use crate::stack::installer::config::PROBE_TIMEOUT;
use crate::stack::installer::core::probe::find_working_url;
use crate::stack::installer::core::traits::ComponentSource;
use reqwest::Client;
use std::time::Duration;

pub struct Discoverer {
    client: Client,
    cache: LocationCache,
    /// When false the cache is not consulted, but proven URLs are still recorded.
    use_cache: bool,
    probe_timeout: Duration,
}

impl Discoverer {
    pub fn new(client: Client, cache: LocationCache, use_cache: bool) -> Self {
        Self {
            client,
            cache,
            use_cache,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// The cached location `discover` would short-circuit to, if any.
    pub fn cached(&self, component: Component) -> Option<&str> {
        if self.use_cache {
            self.cache.lookup(component)
        } else {
            None
        }
    }

    /// Ordered candidates for one component. Never empty: the last tier is
    /// a fixed list.
    pub async fn discover(
        &mut self,
        source: &dyn ComponentSource,
        min_size: Option<u64>,
    ) -> Vec<Candidate> {
        let use_cache = self.use_cache;
        self.discover_with(source, min_size, use_cache).await
    }

    /// Same tiers as `discover`, without reading the cache.
    pub async fn rediscover(
        &mut self,
        source: &dyn ComponentSource,
        min_size: Option<u64>,
    ) -> Vec<Candidate> {
        self.discover_with(source, min_size, false).await
    }

    /// Record a URL that was actually downloaded and installed, replacing
    /// whatever the probe had proven.
    pub async fn remember(&mut self, component: Component, url: &str) {
        if self.cache.lookup(component) == Some(url) {
            return;
        }
        self.cache.record(component, url);
        self.persist().await;
    }

    /// Drop a cached location that failed to download or install.
    pub async fn forget(&mut self, component: Component) {
        if self.cache.forget(component) {
            log::debug!("{}: dropped cached location", component);
            self.persist().await;
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.cache.save().await {
            log::warn!("Failed to save location cache: {:#}", e);
        }
    }

    async fn discover_with(
        &mut self,
        source: &dyn ComponentSource,
        min_size: Option<u64>,
        use_cache: bool,
    ) -> Vec<Candidate> {
        let component = source.component();

        if use_cache {
            if let Some(url) = self.cache.lookup(component) {
                log::info!("{}: using cached location {}", component, url);
                return vec![Candidate::new(url)];
            }
        }

        let mut candidates = match source.primary(&self.client).await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("{}: primary discovery failed: {:#}", component, e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            candidates = match source.secondary(&self.client).await {
                Ok(found) => found,
                Err(e) => {
                    log::debug!("{}: secondary discovery failed: {:#}", component, e);
                    Vec::new()
                }
            };
        }

        if candidates.is_empty() {
            log::debug!("{}: using hardcoded fallback list", component);
            candidates = source.fallback();
        }

        let candidates = dedup_candidates(candidates);
        log::info!("{}: {} candidate(s) discovered", component, candidates.len());

        let working = find_working_url(&self.client, &candidates, min_size, self.probe_timeout)
            .await
            .map(|c| c.url.clone());
        if let Some(url) = working {
            log::debug!("{}: caching proven location {}", component, url);
            self.cache.record(component, &url);
            self.persist().await;
        }

        candidates
    }
}
