use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;
use std::fmt;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid"));

/// Numeric (major, minor, patch) version extracted from an artifact name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the first `X.Y[.Z]` run in the file-name part of `name`.
    /// Anything before the last `/` is ignored so host names and path
    /// segments never contribute digits.
    pub fn parse_from_name(name: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(file_name_of(name))?;
        let part = |i: usize| -> Option<u64> {
            caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
        };
        Some(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Last path segment of a URL or path, without query or fragment.
pub fn file_name_of(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

/// Sort newest first by the version parsed from `name(item)`. Items without a
/// parseable version count as 0.0.0 and keep their relative order.
pub fn sort_newest_first<T>(items: &mut [T], name: impl Fn(&T) -> &str) {
    items.sort_by_key(|item| Reverse(VersionTriple::parse_from_name(name(item)).unwrap_or_default()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upstream_artifact_names() {
        assert_eq!(
            VersionTriple::parse_from_name("httpd-2.4.62-240904-win64-VS17.zip"),
            Some(VersionTriple::new(2, 4, 62))
        );
        assert_eq!(
            VersionTriple::parse_from_name("https://windows.php.net/downloads/releases/php-8.3.10-Win32-vs16-x64.zip"),
            Some(VersionTriple::new(8, 3, 10))
        );
        assert_eq!(
            VersionTriple::parse_from_name("PortableGit-2.46.0.2-64-bit.7z.exe"),
            Some(VersionTriple::new(2, 46, 0))
        );
        assert_eq!(
            VersionTriple::parse_from_name("mod_fcgid-2.3-win64.zip"),
            Some(VersionTriple::new(2, 3, 0))
        );
        assert_eq!(VersionTriple::parse_from_name("composer.phar"), None);
    }

    #[test]
    fn host_digits_do_not_count() {
        assert_eq!(
            VersionTriple::parse_from_name("https://mirror1.2.example/latest.zip"),
            None
        );
    }

    #[test]
    fn sorts_freshest_first_with_unparseable_last() {
        let mut names = vec![
            "php-1.2.0-Win32-vs16-x64.zip",
            "latest.zip",
            "php-1.3.5-Win32-vs16-x64.zip",
            "php-1.3.1-Win32-vs16-x64.zip",
        ];
        sort_newest_first(&mut names, |n| n);
        assert_eq!(
            names,
            vec![
                "php-1.3.5-Win32-vs16-x64.zip",
                "php-1.3.1-Win32-vs16-x64.zip",
                "php-1.2.0-Win32-vs16-x64.zip",
                "latest.zip",
            ]
        );
    }

    #[test]
    fn file_name_strips_query_and_fragment() {
        assert_eq!(file_name_of("https://x.org/a/b.zip?dl=1#top"), "b.zip");
        assert_eq!(file_name_of("b.zip"), "b.zip");
    }
}
