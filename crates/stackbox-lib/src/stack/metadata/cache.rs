use crate::stack::components::Component;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const CACHE_DURATION_HOURS: i64 = 24; // One timestamp covers every entry

/// On-disk shape: `{"Timestamp": "<ISO-8601>", "Urls": {"php": "https://..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    #[serde(rename = "Timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "Urls", default)]
    urls: BTreeMap<String, String>,
}

/// Last-known-good download URL per component, valid for 24 hours as a whole.
#[derive(Debug, Clone)]
pub struct LocationCache {
    path: PathBuf,
    timestamp: Option<DateTime<Utc>>,
    urls: BTreeMap<String, String>,
}

impl LocationCache {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timestamp: None,
            urls: BTreeMap::new(),
        }
    }

    /// Load the cache file. A missing or unreadable file is an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_cache_file(&path).await {
            Ok(Some(file)) => {
                log::debug!(
                    "Loaded {} cached location(s) from {} (written {})",
                    file.urls.len(),
                    path.display(),
                    file.timestamp
                );
                Self {
                    path,
                    timestamp: Some(file.timestamp),
                    urls: file.urls,
                }
            }
            Ok(None) => Self::empty(path),
            Err(e) => {
                log::debug!("Ignoring unusable location cache {}: {:#}", path.display(), e);
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// True while the whole cache is under 24 hours old. A timestamp in the
    /// future is treated as stale.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.timestamp {
            Some(ts) => {
                let age = now - ts;
                age >= Duration::zero() && age < Duration::hours(CACHE_DURATION_HOURS)
            }
            None => false,
        }
    }

    pub fn lookup(&self, component: Component) -> Option<&str> {
        self.lookup_at(component, Utc::now())
    }

    pub fn lookup_at(&self, component: Component, now: DateTime<Utc>) -> Option<&str> {
        if !self.is_fresh_at(now) {
            return None;
        }
        self.urls.get(component.as_str()).map(String::as_str)
    }

    pub fn record(&mut self, component: Component, url: &str) {
        self.record_at(component, url, Utc::now());
    }

    /// Store a proven URL. A stale cache is cleared and restarted at `now`;
    /// a fresh one keeps its original timestamp.
    pub fn record_at(&mut self, component: Component, url: &str, now: DateTime<Utc>) {
        if !self.is_fresh_at(now) {
            self.urls.clear();
            self.timestamp = Some(now);
        }
        self.urls
            .insert(component.as_str().to_string(), url.to_string());
    }

    /// Drop one component's entry, leaving the others and the timestamp.
    pub fn forget(&mut self, component: Component) -> bool {
        self.urls.remove(component.as_str()).is_some()
    }

    pub async fn save(&self) -> Result<()> {
        let Some(timestamp) = self.timestamp else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create location cache directory")?;
        }
        let file = CacheFile {
            timestamp,
            urls: self.urls.clone(),
        };
        let json =
            serde_json::to_string_pretty(&file).context("Failed to serialize location cache")?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        log::debug!("Saved location cache to {}", self.path.display());
        Ok(())
    }
}

async fn read_cache_file(path: &Path) -> Result<Option<CacheFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read location cache")?;
    let file = serde_json::from_str(contents.trim_start_matches('\u{feff}'))
        .context("Failed to parse location cache JSON")?;
    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn expiry_is_whole_cache() {
        let mut cache = LocationCache::empty("unused.json");
        let t0 = at("2024-05-01T10:00:00Z");
        cache.record_at(Component::Php, "https://a/php.zip", t0);
        cache.record_at(
            Component::Apache,
            "https://a/httpd.zip",
            t0 + Duration::hours(20),
        );

        // The second write did not extend the window.
        let later = t0 + Duration::hours(24);
        assert_eq!(cache.lookup_at(Component::Php, later), None);
        assert_eq!(cache.lookup_at(Component::Apache, later), None);
        assert_eq!(
            cache.lookup_at(Component::Apache, t0 + Duration::hours(23)),
            Some("https://a/httpd.zip")
        );
    }

    #[test]
    fn stale_write_clears_other_entries() {
        let mut cache = LocationCache::empty("unused.json");
        let t0 = at("2024-05-01T10:00:00Z");
        cache.record_at(Component::Php, "https://a/php.zip", t0);
        let t1 = t0 + Duration::hours(30);
        cache.record_at(Component::MariaDb, "https://a/mariadb.zip", t1);

        assert_eq!(cache.timestamp(), Some(t1));
        assert_eq!(cache.lookup_at(Component::Php, t1), None);
        assert_eq!(
            cache.lookup_at(Component::MariaDb, t1),
            Some("https://a/mariadb.zip")
        );
    }

    #[test]
    fn forget_drops_one_entry_and_keeps_the_window() {
        let mut cache = LocationCache::empty("unused.json");
        let t0 = at("2024-05-01T10:00:00Z");
        cache.record_at(Component::Php, "https://a/php.zip", t0);
        cache.record_at(Component::Composer, "https://a/composer.phar", t0);

        assert!(cache.forget(Component::Php));
        assert!(!cache.forget(Component::Php));
        assert_eq!(cache.timestamp(), Some(t0));
        let t1 = t0 + Duration::hours(1);
        assert_eq!(cache.lookup_at(Component::Php, t1), None);
        assert_eq!(
            cache.lookup_at(Component::Composer, t1),
            Some("https://a/composer.phar")
        );
    }

    #[test]
    fn future_timestamp_is_stale() {
        let mut cache = LocationCache::empty("unused.json");
        let t0 = at("2024-05-01T10:00:00Z");
        cache.record_at(Component::Git, "https://a/git.exe", t0);
        assert!(!cache.is_fresh_at(t0 - Duration::minutes(5)));
    }

    #[tokio::test]
    async fn reads_offset_timestamps_and_survives_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("url-cache.json");
        std::fs::write(
            &path,
            r#"{"Timestamp":"2024-05-01T12:00:00+02:00","Urls":{"php":"https://x/php.zip"}}"#,
        )
        .unwrap();

        let cache = LocationCache::load(&path).await;
        assert_eq!(cache.timestamp(), Some(at("2024-05-01T10:00:00Z")));
        assert_eq!(
            cache.lookup_at(Component::Php, at("2024-05-01T11:00:00Z")),
            Some("https://x/php.zip")
        );

        std::fs::write(&path, "{ not json").unwrap();
        let cache = LocationCache::load(&path).await;
        assert_eq!(cache.timestamp(), None);
        assert_eq!(cache.lookup(Component::Php), None);
    }

    #[tokio::test]
    async fn save_uses_expected_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("downloads").join("url-cache.json");
        let mut cache = LocationCache::empty(&path);
        cache.record(Component::Composer, "https://getcomposer.org/download/2.7.7/composer.phar");
        cache.save().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["Timestamp"].is_string());
        assert_eq!(
            raw["Urls"]["composer"],
            "https://getcomposer.org/download/2.7.7/composer.phar"
        );

        let reloaded = LocationCache::load(&path).await;
        assert_eq!(
            reloaded.lookup(Component::Composer),
            Some("https://getcomposer.org/download/2.7.7/composer.phar")
        );
    }
}
