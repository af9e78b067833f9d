//! `apache/conf/httpd.conf`.

use super::params::ParameterSet;
use crate::stack::paths::StackPaths;
use crate::utils::fs::forward_slashes;
use std::path::PathBuf;

const PHP_APACHE_MODULE: &str = "php8apache2_4.dll";

const BASE_MODULES: &[(&str, &str)] = &[
    ("access_compat_module", "mod_access_compat.so"),
    ("actions_module", "mod_actions.so"),
    ("alias_module", "mod_alias.so"),
    ("authz_core_module", "mod_authz_core.so"),
    ("authz_host_module", "mod_authz_host.so"),
    ("dir_module", "mod_dir.so"),
    ("env_module", "mod_env.so"),
    ("headers_module", "mod_headers.so"),
    ("log_config_module", "mod_log_config.so"),
    ("mime_module", "mod_mime.so"),
    ("rewrite_module", "mod_rewrite.so"),
    ("setenvif_module", "mod_setenvif.so"),
];

/// How Apache hands `.php` requests to PHP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhpHandler {
    /// mod_fcgid driving `php-cgi.exe`.
    FastCgi,
    /// PHP's own Apache module DLL.
    ApacheModule,
    None,
}

impl PhpHandler {
    /// Decided from what is on disk right now: the FastCGI module wins when
    /// present.
    pub fn detect(paths: &StackPaths) -> Self {
        if paths.apache_modules_dir().join("mod_fcgid.so").is_file() {
            Self::FastCgi
        } else if php_module_path(paths).is_file() {
            Self::ApacheModule
        } else {
            Self::None
        }
    }
}

fn php_module_path(paths: &StackPaths) -> PathBuf {
    paths.php_dir().join(PHP_APACHE_MODULE)
}

pub fn render_httpd_conf(params: &ParameterSet, handler: PhpHandler) -> String {
    let paths = params.paths();
    let server_root = forward_slashes(&paths.apache_dir());
    let document_root = forward_slashes(&paths.document_root());
    let logs = forward_slashes(&paths.logs_dir());
    let php_dir = forward_slashes(&paths.php_dir());
    let port = params.app_port;

    let modules: String = BASE_MODULES
        .iter()
        .map(|(name, file)| format!("LoadModule {name} modules/{file}\n"))
        .collect();
    let exec_cgi = if handler == PhpHandler::FastCgi {
        " +ExecCGI"
    } else {
        ""
    };
    let php_block = match handler {
        PhpHandler::FastCgi => format!(
            r#"LoadModule fcgid_module modules/mod_fcgid.so
<IfModule fcgid_module>
    FcgidInitialEnv PHPRC "{php_dir}"
    FcgidInitialEnv PHP_FCGI_MAX_REQUESTS 1000
    FcgidIOTimeout 120
    FcgidMaxRequestLen 67108864
    AddHandler fcgid-script .php
    FcgidWrapper "{php_dir}/php-cgi.exe" .php
</IfModule>
"#
        ),
        PhpHandler::ApacheModule => format!(
            r#"LoadModule php_module "{php_dir}/{PHP_APACHE_MODULE}"
<IfModule php_module>
    PHPIniDir "{php_dir}"
    AddHandler application/x-httpd-php .php
</IfModule>
"#
        ),
        PhpHandler::None => {
            format!("# No PHP handler found under {php_dir}; .php files are served as text.\n")
        }
    };

    format!(
        r#"# Generated by stackbox. Changes are overwritten by `stackbox configure`.
Define SRVROOT "{server_root}"
ServerRoot "${{SRVROOT}}"
Listen 127.0.0.1:{port}
ServerName localhost:{port}
ServerAdmin admin@localhost

{modules}
DocumentRoot "{document_root}"
<Directory "{document_root}">
    Options -Indexes +FollowSymLinks{exec_cgi}
    AllowOverride All
    Require all granted
</Directory>
<Files ".env">
    Require all denied
</Files>

<IfModule dir_module>
    DirectoryIndex index.php index.html
</IfModule>
ErrorLog "{logs}/apache_error.log"
LogLevel warn
<IfModule log_config_module>
    LogFormat "%h %l %u %t \"%r\" %>s %b" common
    CustomLog "{logs}/apache_access.log" common
</IfModule>
<IfModule mime_module>
    TypesConfig conf/mime.types
</IfModule>

{php_block}"#
    )
}

/// Port from the first `Listen` directive, with or without an address.
pub fn listen_port(conf: &str) -> Option<u16> {
    conf.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Listen "))
        .and_then(|value| value.trim().rsplit(':').next())
        .and_then(|port| port.parse().ok())
}
