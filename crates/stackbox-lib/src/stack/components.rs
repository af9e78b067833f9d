//! The third-party components a stack is assembled from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How a downloaded artifact is turned into an installed directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Ordinary zip. `strip_wrapper` hoists a single top-level folder.
    Zip { strip_wrapper: bool },
    /// 7-Zip self-extracting executable, run with `-o<dir> -y`.
    SelfExtracting,
    /// A single file copied to the marker path as-is.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Apache,
    ModFcgid,
    Php,
    MariaDb,
    Composer,
    Git,
}

impl Component {
    /// Install order. `ModFcgid` lands inside the web server tree, so it
    /// follows `Apache`.
    pub const ALL: [Component; 6] = [
        Component::Apache,
        Component::ModFcgid,
        Component::Php,
        Component::MariaDb,
        Component::Composer,
        Component::Git,
    ];

    /// Stable key used in the location cache and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apache => "apache",
            Self::ModFcgid => "mod_fcgid",
            Self::Php => "php",
            Self::MariaDb => "mariadb",
            Self::Composer => "composer",
            Self::Git => "git",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "apache" | "httpd" => Some(Self::Apache),
            "mod_fcgid" | "fcgid" => Some(Self::ModFcgid),
            "php" => Some(Self::Php),
            "mariadb" | "mysql" => Some(Self::MariaDb),
            "composer" => Some(Self::Composer),
            "git" => Some(Self::Git),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Apache => "Apache HTTP Server",
            Self::ModFcgid => "mod_fcgid",
            Self::Php => "PHP",
            Self::MariaDb => "MariaDB",
            Self::Composer => "Composer",
            Self::Git => "Git for Windows",
        }
    }

    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            Self::Apache | Self::ModFcgid | Self::MariaDb => ArtifactKind::Zip {
                strip_wrapper: true,
            },
            Self::Php => ArtifactKind::Zip {
                strip_wrapper: false,
            },
            Self::Composer => ArtifactKind::Raw,
            Self::Git => ArtifactKind::SelfExtracting,
        }
    }

    /// Component-scoped artifact name inside the downloads directory.
    pub fn artifact_file_name(self) -> &'static str {
        match self {
            Self::Apache => "apache.zip",
            Self::ModFcgid => "mod_fcgid.zip",
            Self::Php => "php.zip",
            Self::MariaDb => "mariadb.zip",
            Self::Composer => "composer.phar",
            Self::Git => "git.7z.exe",
        }
    }

    /// File relative to the install directory whose presence means the
    /// component is installed.
    pub fn marker(self) -> &'static Path {
        Path::new(match self {
            Self::Apache => "bin/httpd.exe",
            Self::ModFcgid => "mod_fcgid.so",
            Self::Php => "php.exe",
            Self::MariaDb => "bin/mysqld.exe",
            Self::Composer => "composer.phar",
            Self::Git => "cmd/git.exe",
        })
    }

    /// Smallest artifact accepted from a download or the watched folder.
    pub fn min_size(self) -> u64 {
        match self {
            Self::Apache => 5_000_000,
            Self::ModFcgid => 20_000,
            Self::Php => 10_000_000,
            Self::MariaDb => 50_000_000,
            Self::Composer => 1_000_000,
            Self::Git => 20_000_000,
        }
    }

    /// Optional components only produce warnings when they cannot be acquired.
    pub fn is_required(self) -> bool {
        !matches!(self, Self::ModFcgid | Self::Git)
    }

    /// Page an operator is sent to when every candidate failed.
    pub fn download_page(self) -> &'static str {
        match self {
            Self::Apache | Self::ModFcgid => "https://www.apachelounge.com/download/",
            Self::Php => "https://windows.php.net/download/",
            Self::MariaDb => "https://mariadb.org/download/",
            Self::Composer => "https://getcomposer.org/download/",
            Self::Git => "https://github.com/git-for-windows/git/releases/latest",
        }
    }

    /// Case-insensitive file name pattern searched for in the Downloads folder.
    pub fn manual_file_pattern(self) -> &'static str {
        match self {
            Self::Apache => r"(?i)^httpd-2\.4\.\d+.*win64.*\.zip$",
            Self::ModFcgid => r"(?i)^mod_fcgid-[\d.]+.*win64.*\.zip$",
            Self::Php => r"(?i)^php-8\.\d+\.\d+-win32-vs\d+-x64\.zip$",
            Self::MariaDb => r"(?i)^mariadb-\d+\.\d+\.\d+-winx64\.zip$",
            Self::Composer => r"(?i)^composer(\s*\(\d+\))?\.phar$",
            Self::Git => r"(?i)^portablegit-[\d.]+-64-bit\.7z\.exe$",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
