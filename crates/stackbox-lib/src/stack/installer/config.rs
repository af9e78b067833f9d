//! Centralized installer settings.
//! Timeouts, retry policy and upstream endpoints used by the acquisition
//! pipeline. Per-run values (root, ports, credentials) live in `ParameterSet`.

use std::time::Duration;

/// Release-listing API and HTML index requests.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);
/// HEAD requests issued by the reachability prober.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-body download of one artifact.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
/// Self-extracting archives can be slow on spinning disks.
pub const SELF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(600);
/// Fixed anti-corruption floor applied to every download, independent of the
/// component's own minimum size.
pub const MIN_ARTIFACT_BYTES: u64 = 1000;

pub const USER_AGENT: &str = concat!("stackbox/", env!("CARGO_PKG_VERSION"));

// URL Constants
pub const APACHE_LOUNGE_DOWNLOAD_URL: &str = "https://www.apachelounge.com/download/";
pub const PHP_WINDOWS_BASE_URL: &str = "https://windows.php.net";
pub const MARIADB_REST_API_URL: &str = "https://downloads.mariadb.org/rest-api/mariadb";
pub const MARIADB_PREFERRED_SERIES: &str = "11.4";
pub const COMPOSER_BASE_URL: &str = "https://getcomposer.org";
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GIT_FOR_WINDOWS_REPO: &str = "git-for-windows/git";

/// Shared HTTP client for one run. Timeouts are applied per request.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
}
