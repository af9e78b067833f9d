//! Configuration synthesis.
//!
//! Every artifact is rendered from one `ParameterSet`; nothing re-states a
//! port, path or credential on its own. After writing, the files are parsed
//! back and compared against the parameters.

pub mod credentials;
pub mod env;
pub mod httpd;
pub mod mariadb;
pub mod params;
pub mod php;
pub mod writer;


use crate::stack::installer::types::StackError;
use crate::stack::paths::StackPaths;
use anyhow::{Context, Result};
use httpd::PhpHandler;
use params::ParameterSet;
use std::path::Path;
use writer::{has_bom, write_text, TextEncoding};

pub use env::parse_env;

/// Rendered text of every generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifacts {
    pub php_handler: PhpHandler,
    pub httpd_conf: String,
    pub my_ini: String,
    pub php_ini: String,
    pub env: String,
    /// Written to a throwaway file by the database bootstrap, never kept.
    pub credentials_sql: String,
}

/// Render everything. The PHP handler is detected from disk at this point.
pub fn render_artifacts(params: &ParameterSet) -> ConfigArtifacts {
    let php_handler = PhpHandler::detect(&params.paths());
    log::debug!("PHP handler: {:?}", php_handler);
    ConfigArtifacts {
        php_handler,
        httpd_conf: httpd::render_httpd_conf(params, php_handler),
        my_ini: mariadb::render_my_ini(params),
        php_ini: php::render_php_ini(params),
        env: env::render_env(params),
        credentials_sql: credentials::render_credentials_sql(params),
    }
}

pub async fn write_artifacts(paths: &StackPaths, artifacts: &ConfigArtifacts) -> Result<()> {
    write_text(&paths.httpd_conf(), &artifacts.httpd_conf, TextEncoding::Utf8).await?;
    write_text(&paths.my_ini(), &artifacts.my_ini, TextEncoding::Utf8).await?;
    write_text(&paths.php_ini(), &artifacts.php_ini, TextEncoding::Utf8).await?;
    write_text(&paths.env_file(), &artifacts.env, TextEncoding::Utf8).await?;
    tokio::fs::create_dir_all(paths.logs_dir())
        .await
        .context("failed to create logs directory")?;
    tokio::fs::create_dir_all(paths.document_root())
        .await
        .context("failed to create document root")?;
    Ok(())
}

/// Render, write and verify in one step.
pub async fn synthesize(params: &ParameterSet) -> Result<ConfigArtifacts> {
    let paths = params.paths();
    let artifacts = render_artifacts(params);
    write_artifacts(&paths, &artifacts).await?;
    verify_consistency(params).await?;
    log::info!(
        "Configuration written (app port {}, db port {})",
        params.app_port,
        params.db_port
    );
    Ok(artifacts)
}

/// Parse the written `.env`, `my.ini` and `httpd.conf` back and fail with
/// `StackError::ConfigDrift` on the first value that disagrees with `params`.
pub async fn verify_consistency(params: &ParameterSet) -> Result<()> {
    let paths = params.paths();

    let env_text = read_artifact(&paths.env_file()).await?;
    let vars = parse_env(&env_text);
    let expected_env = [
        ("APP_URL", params.app_url()),
        ("APP_KEY", params.app_secret.clone()),
        ("DB_PORT", params.db_port.to_string()),
        ("DB_DATABASE", params.db_name.clone()),
        ("DB_USERNAME", params.db_user.clone()),
        ("DB_PASSWORD", params.db_password.clone()),
    ];
    for (key, expected) in expected_env {
        let actual = vars.get(key).map(String::as_str);
        if key == "APP_KEY" || key == "DB_PASSWORD" {
            if actual != Some(expected.as_str()) {
                return Err(StackError::ConfigDrift {
                    detail: format!(".env {key} does not match the configured value"),
                }
                .into());
            }
            continue;
        }
        check(&format!(".env {key}"), actual, &expected)?;
    }

    let ini = mariadb::parse_ini(&read_artifact(&paths.my_ini()).await?);
    let db_port = params.db_port.to_string();
    for section in ["mysqld", "client"] {
        let port = ini.get(section).and_then(|s| s.get("port")).map(String::as_str);
        check(&format!("my.ini [{section}] port"), port, &db_port)?;
    }

    let conf = read_artifact(&paths.httpd_conf()).await?;
    let listen = httpd::listen_port(&conf).map(|p| p.to_string());
    check(
        "httpd.conf Listen",
        listen.as_deref(),
        &params.app_port.to_string(),
    )?;

    Ok(())
}

/// `APP_KEY` from an existing `.env`, so re-running configuration keeps the
/// application's encryption key.
pub async fn existing_app_secret(paths: &StackPaths) -> Option<String> {
    let text = tokio::fs::read_to_string(paths.env_file()).await.ok()?;
    parse_env(&text)
        .remove("APP_KEY")
        .filter(|key| key.starts_with("base64:"))
}

async fn read_artifact(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if has_bom(&bytes) {
        return Err(StackError::ConfigDrift {
            detail: format!("{} starts with a byte-order mark", path.display()),
        }
        .into());
    }
    String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path.display()))
}

fn check(what: &str, actual: Option<&str>, expected: &str) -> Result<()> {
    if actual == Some(expected) {
        return Ok(());
    }
    Err(StackError::ConfigDrift {
        detail: format!("{what} is {actual:?}, expected {expected:?}"),
    }
    .into())
}
