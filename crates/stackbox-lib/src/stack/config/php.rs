//! `php/php.ini`.

use super::params::ParameterSet;
use crate::utils::fs::forward_slashes;

/// Extensions a Laravel-style application expects, enabled only when the
/// DLL is actually present in `ext/`.
const REQUIRED_EXTENSIONS: &[&str] = &[
    "curl", "fileinfo", "gd", "intl", "mbstring", "mysqli", "openssl", "pdo_mysql", "sodium", "zip",
];

pub fn render_php_ini(params: &ParameterSet) -> String {
    let paths = params.paths();
    let php_dir = paths.php_dir();
    let ext_dir = php_dir.join("ext");
    let logs = forward_slashes(&paths.logs_dir());
    let port = params.db_port;

    let extensions: String = REQUIRED_EXTENSIONS
        .iter()
        .filter(|name| ext_dir.join(format!("php_{name}.dll")).is_file())
        .map(|name| format!("extension={name}\n"))
        .collect();
    let opcache = if ext_dir.join("php_opcache.dll").is_file() {
        "zend_extension=opcache\nopcache.enable=1\n"
    } else {
        ""
    };
    let ext_dir = forward_slashes(&ext_dir);

    format!(
        r#"[PHP]
engine=On
short_open_tag=Off
memory_limit=512M
max_execution_time=120
upload_max_filesize=64M
post_max_size=64M
display_errors=On
log_errors=On
error_log="{logs}/php_error.log"
extension_dir="{ext_dir}"
{extensions}{opcache}
[Date]
date.timezone=UTC

[MySQLi]
mysqli.default_host=127.0.0.1
mysqli.default_port={port}
"#
    )
}
