use crate::utils::version::file_name_of;
use std::collections::HashSet;

/// One possible download location for a component artifact, before it has
/// been confirmed reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Lowercase hex SHA-256 when the upstream publishes one.
    pub sha256: Option<String>,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, digest: Option<&str>) -> Self {
        self.sha256 = digest
            .map(|d| d.trim().trim_start_matches("sha256:").to_ascii_lowercase())
            .filter(|d| d.len() == 64 && d.chars().all(|c| c.is_ascii_hexdigit()));
        self
    }

    pub fn file_name(&self) -> &str {
        file_name_of(&self.url)
    }
}

/// Drop repeated URLs, keeping the first occurrence and discovery order.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_normalized_or_dropped() {
        let digest = "sha256:ABCDEF0123456789abcdef0123456789ABCDEF0123456789abcdef0123456789";
        let c = Candidate::new("https://x/y.zip").with_sha256(Some(digest));
        assert_eq!(
            c.sha256.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789")
        );
        let bad = Candidate::new("https://x/y.zip").with_sha256(Some("not-a-digest"));
        assert_eq!(bad.sha256, None);
    }

    #[test]
    fn dedup_preserves_discovery_order() {
        let list = vec![
            Candidate::new("a"),
            Candidate::new("b"),
            Candidate::new("a"),
            Candidate::new("c"),
        ];
        let urls: Vec<_> = dedup_candidates(list).into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
    }
}
