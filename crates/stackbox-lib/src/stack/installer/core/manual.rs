//! Operator-in-the-loop acquisition once every candidate has failed.
//!
//! The pipeline never blocks on a human here: it hands back a
//! `ManualAcquisition` and the front end decides how to prompt.

use super::fallback::CandidateFailure;
use crate::stack::components::Component;
use crate::stack::paths::StackPaths;
use crate::utils::fs::file_size;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct ManualAcquisition {
    pub component: Component,
    /// Canonical page the operator downloads from.
    pub download_page: String,
    /// Per-user Downloads folder, when the platform exposes one.
    pub watched_dir: Option<PathBuf>,
    /// Case-insensitive regex matched against file names in `watched_dir`.
    pub file_pattern: String,
    pub min_size: u64,
    /// Exact path the artifact may also be placed at by hand.
    pub destination: PathBuf,
    pub failures: Vec<CandidateFailure>,
}

impl ManualAcquisition {
    pub fn for_component(
        component: Component,
        paths: &StackPaths,
        failures: Vec<CandidateFailure>,
    ) -> Self {
        let watched_dir = directories::UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf));
        Self {
            component,
            download_page: component.download_page().to_string(),
            watched_dir,
            file_pattern: component.manual_file_pattern().to_string(),
            min_size: component.min_size(),
            destination: paths.artifact_path(component),
            failures,
        }
    }

    pub fn with_watched_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watched_dir = Some(dir.into());
        self
    }

    /// Remediation text for the operator.
    pub fn instructions(&self) -> String {
        let mut text = format!(
            "{} could not be downloaded automatically.\n",
            self.component.display_name()
        );
        for failure in &self.failures {
            text.push_str(&format!("  - {}: {}\n", failure.url, failure.reason));
        }
        text.push_str(&format!(
            "Download it manually from:\n  {}\n",
            self.download_page
        ));
        if let Some(dir) = &self.watched_dir {
            text.push_str(&format!(
                "Save it to {} (file name matching {}), or\n",
                dir.display(),
                self.file_pattern
            ));
        }
        text.push_str(&format!(
            "place it at exactly:\n  {}\nThe file must be at least {} bytes.",
            self.destination.display(),
            self.min_size
        ));
        text
    }

    pub fn open_download_page(&self) -> Result<()> {
        open::that(&self.download_page)
            .with_context(|| format!("failed to open {} in a browser", self.download_page))
    }

    /// The artifact, if the operator has provided one: the exact destination
    /// path first, then the newest matching file in the watched folder.
    pub fn find_download(&self) -> Result<Option<PathBuf>> {
        if file_size(&self.destination).is_some_and(|size| size >= self.min_size) {
            return Ok(Some(self.destination.clone()));
        }
        let Some(dir) = &self.watched_dir else {
            return Ok(None);
        };
        let pattern = Regex::new(&self.file_pattern)
            .with_context(|| format!("invalid file pattern {}", self.file_pattern))?;
        find_in_folder(dir, &pattern, self.min_size)
    }
}

/// Most recently modified file in `dir` whose name matches `pattern` and whose
/// size is at least `min_size`.
pub fn find_in_folder(dir: &Path, pattern: &Regex, min_size: u64) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.is_match(name) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() || meta.len() < min_size {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().is_none_or(|(newest, _)| modified > *newest) {
            best = Some((modified, entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(path: &Path, size: usize, modified: SystemTime) {
        fs::write(path, vec![0u8; size]).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn prefers_newest_match_above_minimum() {
        let tmp = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        touch(&tmp.path().join("mariadb-11.4.2-winx64.zip"), 2048, base);
        touch(
            &tmp.path().join("mariadb-11.4.3-winx64.zip"),
            2048,
            base + Duration::from_secs(60),
        );
        touch(
            &tmp.path().join("mariadb-11.4.4-winx64.zip"),
            10,
            base + Duration::from_secs(120),
        );
        touch(
            &tmp.path().join("notes.txt"),
            4096,
            base + Duration::from_secs(180),
        );

        let pattern = Regex::new(Component::MariaDb.manual_file_pattern()).unwrap();
        let found = find_in_folder(tmp.path(), &pattern, 1024).unwrap().unwrap();
        assert_eq!(found, tmp.path().join("mariadb-11.4.3-winx64.zip"));
    }

    #[test]
    fn exact_destination_wins_over_watched_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StackPaths::new(tmp.path().join("stack"));
        let watched = tmp.path().join("Downloads");
        fs::create_dir_all(&watched).unwrap();
        fs::create_dir_all(paths.downloads_dir()).unwrap();

        let mut manual = ManualAcquisition::for_component(Component::Composer, &paths, Vec::new())
            .with_watched_dir(&watched);
        manual.min_size = 100;

        assert_eq!(manual.find_download().unwrap(), None);

        touch(&watched.join("composer.phar"), 200, SystemTime::now());
        assert_eq!(
            manual.find_download().unwrap(),
            Some(watched.join("composer.phar"))
        );

        touch(&paths.artifact_path(Component::Composer), 200, SystemTime::now());
        assert_eq!(
            manual.find_download().unwrap(),
            Some(paths.artifact_path(Component::Composer))
        );
    }

    #[test]
    fn instructions_name_exact_destination_and_failures() {
        let paths = StackPaths::new("/opt/stack");
        let manual = ManualAcquisition::for_component(
            Component::Php,
            &paths,
            vec![CandidateFailure {
                url: "https://windows.php.net/downloads/releases/php-8.3.10-Win32-vs16-x64.zip".into(),
                reason: "HTTP error 404".into(),
            }],
        );
        let text = manual.instructions();
        assert!(text.contains("HTTP error 404"));
        assert!(text.contains("https://windows.php.net/download/"));
        assert!(text.contains(&paths.artifact_path(Component::Php).display().to_string()));
    }
}
