//! Every location inside the stack root, derived once from the root path.

use crate::stack::components::Component;
use std::path::{Path, PathBuf};

const LOCATION_CACHE_FILE: &str = "url-cache.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackPaths {
    root: PathBuf,
}

impl StackPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn apache_dir(&self) -> PathBuf {
        self.root.join("apache")
    }

    pub fn apache_modules_dir(&self) -> PathBuf {
        self.apache_dir().join("modules")
    }

    pub fn php_dir(&self) -> PathBuf {
        self.root.join("php")
    }

    pub fn mariadb_dir(&self) -> PathBuf {
        self.root.join("mariadb")
    }

    pub fn mariadb_data_dir(&self) -> PathBuf {
        self.mariadb_dir().join("data")
    }

    pub fn composer_dir(&self) -> PathBuf {
        self.root.join("composer")
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join("git")
    }

    /// Application source tree.
    pub fn app_dir(&self) -> PathBuf {
        self.root.join("www")
    }

    /// Web server document root (the application's public directory).
    pub fn document_root(&self) -> PathBuf {
        self.app_dir().join("public")
    }

    pub fn location_cache_file(&self) -> PathBuf {
        self.downloads_dir().join(LOCATION_CACHE_FILE)
    }

    pub fn httpd_conf(&self) -> PathBuf {
        self.apache_dir().join("conf").join("httpd.conf")
    }

    pub fn my_ini(&self) -> PathBuf {
        self.mariadb_dir().join("my.ini")
    }

    pub fn php_ini(&self) -> PathBuf {
        self.php_dir().join("php.ini")
    }

    pub fn env_file(&self) -> PathBuf {
        self.app_dir().join(".env")
    }

    pub fn install_dir(&self, component: Component) -> PathBuf {
        match component {
            Component::Apache => self.apache_dir(),
            Component::ModFcgid => self.apache_modules_dir(),
            Component::Php => self.php_dir(),
            Component::MariaDb => self.mariadb_dir(),
            Component::Composer => self.composer_dir(),
            Component::Git => self.git_dir(),
        }
    }

    pub fn marker_path(&self, component: Component) -> PathBuf {
        self.install_dir(component).join(component.marker())
    }

    pub fn artifact_path(&self, component: Component) -> PathBuf {
        self.downloads_dir().join(component.artifact_file_name())
    }

    pub fn is_installed(&self, component: Component) -> bool {
        self.marker_path(component).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerator_lands_in_web_server_modules() {
        let paths = StackPaths::new("/opt/stack");
        assert_eq!(
            paths.marker_path(Component::ModFcgid),
            PathBuf::from("/opt/stack/apache/modules/mod_fcgid.so")
        );
        assert_eq!(
            paths.marker_path(Component::MariaDb),
            PathBuf::from("/opt/stack/mariadb/bin/mysqld.exe")
        );
        assert_eq!(
            paths.location_cache_file(),
            PathBuf::from("/opt/stack/downloads/url-cache.json")
        );
    }
}
