//! `mariadb/my.ini`. The server's option parser requires the very first
//! bytes of the file to be a section header.

use super::params::ParameterSet;
use crate::utils::fs::forward_slashes;
use std::collections::HashMap;

pub fn render_my_ini(params: &ParameterSet) -> String {
    let paths = params.paths();
    let basedir = forward_slashes(&paths.mariadb_dir());
    let datadir = forward_slashes(&paths.mariadb_data_dir());
    let logs = forward_slashes(&paths.logs_dir());
    let port = params.db_port;

    format!(
        r#"[mysqld]
basedir="{basedir}"
datadir="{datadir}"
port={port}
bind-address=127.0.0.1
character-set-server=utf8mb4
collation-server=utf8mb4_unicode_ci
max_allowed_packet=64M
innodb_buffer_pool_size=256M
log-error="{logs}/mariadb_error.log"

[client]
host=127.0.0.1
port={port}
default-character-set=utf8mb4
"#
    )
}

/// `section -> key -> value` for a MySQL-style option file. Keys are
/// lowercased; values lose surrounding double quotes.
pub fn parse_ini(text: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_ascii_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.to_string());
        }
    }
    sections
}
