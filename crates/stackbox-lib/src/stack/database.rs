//! First-run MariaDB bootstrap: data directory initialization, a temporary
//! server, and the application credentials.

use crate::stack::config::params::ParameterSet;
use crate::stack::config::writer::{encode_text, TextEncoding};
use crate::stack::installer::types::StackError;
use crate::stack::paths::StackPaths;
use crate::utils::fs::forward_slashes;
use crate::utils::process::{run_process, StackCommandExt};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Child;

const INIT_TIMEOUT: Duration = Duration::from_secs(180);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Which initializer produced the system tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStrategy {
    AlreadyInitialized,
    InstallDb,
    LegacyInstallDb,
    InstallDbClean,
    InitializeInsecure,
}

fn bin(paths: &StackPaths, name: &str) -> PathBuf {
    paths
        .mariadb_dir()
        .join("bin")
        .join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

fn system_tables(paths: &StackPaths) -> PathBuf {
    paths.mariadb_data_dir().join("mysql")
}

/// Create the data directory's system tables, trying each initializer in
/// turn until `data/mysql` exists.
pub async fn initialize_data_dir(params: &ParameterSet) -> Result<InitStrategy> {
    let paths = params.paths();
    if system_tables(&paths).is_dir() {
        log::info!("MariaDB data directory already initialized");
        return Ok(InitStrategy::AlreadyInitialized);
    }

    let data_dir = paths.mariadb_data_dir();
    let datadir_arg = format!("--datadir={}", forward_slashes(&data_dir));
    let port_arg = format!("--port={}", params.db_port);
    let defaults_arg = format!("--defaults-file={}", forward_slashes(&paths.my_ini()));

    let attempts: [(InitStrategy, PathBuf, Vec<String>); 4] = [
        (
            InitStrategy::InstallDb,
            bin(&paths, "mariadb-install-db"),
            vec![datadir_arg.clone(), port_arg.clone()],
        ),
        (
            InitStrategy::LegacyInstallDb,
            bin(&paths, "mysql_install_db"),
            vec![datadir_arg.clone(), port_arg],
        ),
        (
            InitStrategy::InstallDbClean,
            bin(&paths, "mariadb-install-db"),
            vec![datadir_arg.clone()],
        ),
        (
            InitStrategy::InitializeInsecure,
            bin(&paths, "mysqld"),
            vec![defaults_arg, "--initialize-insecure".into(), datadir_arg],
        ),
    ];

    let mut last_error = String::from("no initializer was run");
    for (strategy, program, args) in attempts {
        if strategy == InitStrategy::InstallDbClean {
            clear_dir(&data_dir).await?;
        }
        log::info!("Initializing MariaDB data directory ({:?})", strategy);
        let output = run_process(&program, &args, Some(&paths.mariadb_dir()), INIT_TIMEOUT).await;
        if system_tables(&paths).is_dir() {
            if !output.success() {
                log::warn!("{} but the system tables exist", output.describe());
            }
            return Ok(strategy);
        }
        log::warn!("{:?} did not initialize the data directory: {}", strategy, output.describe());
        last_error = output.describe();
    }

    Err(StackError::DatabaseInitFailed { last_error }.into())
}

async fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        tokio::fs::remove_dir_all(dir)
            .await
            .with_context(|| format!("failed to clear {}", dir.display()))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))
}

/// A `mysqld` started just long enough to apply credentials. Killed if
/// dropped without `shutdown`.
pub struct BootstrapServer {
    child: Child,
    port: u16,
    paths: StackPaths,
}

impl BootstrapServer {
    pub async fn start(params: &ParameterSet) -> Result<Self> {
        let paths = params.paths();
        let program = bin(&paths, "mysqld");
        if !program.is_file() {
            bail!("{} not found", program.display());
        }

        let mut command = tokio::process::Command::new(&program);
        command
            .arg(format!("--defaults-file={}", forward_slashes(&paths.my_ini())))
            .arg("--console")
            .current_dir(paths.mariadb_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command.suppress_console();

        let child = command
            .spawn()
            .with_context(|| format!("failed to start {}", program.display()))?;
        log::info!(
            "Started bootstrap MariaDB server (pid {:?}) on port {}",
            child.id(),
            params.db_port
        );
        Ok(Self {
            child,
            port: params.db_port,
            paths,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Poll the TCP port until it accepts connections.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                bail!("MariaDB server exited before accepting connections ({status})");
            }
            if let Ok(Ok(_)) =
                tokio::time::timeout(READY_POLL_INTERVAL, TcpStream::connect(("127.0.0.1", self.port)))
                    .await
            {
                log::debug!("MariaDB is accepting connections on {}", self.port);
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "MariaDB did not accept connections on port {} within {}s",
                    self.port,
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Ask the server to stop, then kill it if it is still running.
    pub async fn shutdown(mut self) -> Result<()> {
        let admin = bin(&self.paths, "mysqladmin");
        let port = format!("--port={}", self.port);
        let output = run_process(
            &admin,
            ["--host=127.0.0.1", port.as_str(), "--user=root", "shutdown"],
            None,
            SHUTDOWN_TIMEOUT,
        )
        .await;

        if output.success() {
            if let Ok(status) = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
                log::info!("Bootstrap MariaDB server stopped ({})", status?);
                return Ok(());
            }
        } else {
            log::warn!("Graceful shutdown failed: {}", output.describe());
        }

        self.child
            .kill()
            .await
            .context("failed to kill bootstrap MariaDB server")?;
        log::warn!("Bootstrap MariaDB server killed");
        Ok(())
    }
}

/// `bin/mariadb` when present, otherwise the older `bin/mysql` client.
fn client_program(paths: &StackPaths) -> PathBuf {
    let modern = bin(paths, "mariadb");
    if modern.is_file() {
        modern
    } else {
        bin(paths, "mysql")
    }
}

/// Run the credential SQL through the client as root. The script lives in a
/// temporary file that is removed whatever the outcome.
pub async fn apply_credentials(params: &ParameterSet, sql: &str) -> Result<()> {
    let paths = params.paths();
    let bytes = encode_text(sql, TextEncoding::Ascii).context("credential script")?;

    let mut script = tempfile::Builder::new()
        .prefix("stackbox-credentials-")
        .suffix(".sql")
        .tempfile()
        .context("failed to create temporary SQL file")?;
    script.write_all(&bytes)?;
    script.flush()?;

    let source = format!("source {}", forward_slashes(script.path()));
    let port = format!("--port={}", params.db_port);
    let output = run_process(
        &client_program(&paths),
        ["--host=127.0.0.1", port.as_str(), "--user=root", "-e", source.as_str()],
        None,
        CLIENT_TIMEOUT,
    )
    .await;
    drop(script);

    if output.success() {
        log::info!(
            "Database {} and user {} are ready",
            params.db_name,
            params.db_user
        );
        Ok(())
    } else {
        bail!(
            "applying credentials failed: {}\nRun it by hand with: {} --host=127.0.0.1 {} --user=root",
            output.describe(),
            forward_slashes(&client_program(&paths)),
            port
        )
    }
}

/// Initialize, start, apply credentials and stop.
pub async fn bootstrap_database(params: &ParameterSet, credentials_sql: &str) -> Result<()> {
    initialize_data_dir(params).await?;
    let mut server = BootstrapServer::start(params).await?;
    let applied = match server.wait_until_ready(READY_TIMEOUT).await {
        Ok(()) => apply_credentials(params, credentials_sql).await,
        Err(e) => Err(e),
    };
    let stopped = server.shutdown().await;
    settle(applied, stopped)
}

/// The credential error wins over a shutdown error; the latter is logged.
fn settle(applied: Result<()>, stopped: Result<()>) -> Result<()> {
    match (applied, stopped) {
        (Ok(()), stopped) => stopped,
        (Err(e), stopped) => {
            if let Err(stop) = stopped {
                log::warn!("Failed to stop bootstrap MariaDB server: {:#}", stop);
            }
            Err(e)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn params(root: &Path, db_port: u16) -> ParameterSet {
        ParameterSet::new(root, 18080, db_port, "app", "app_user", "secret").unwrap()
    }

    fn script(paths: &StackPaths, name: &str, body: &str) {
        let path = bin(paths, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn falls_through_to_legacy_initializer() {
        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), 13307);
        let paths = p.paths();
        script(&paths, "mariadb-install-db", "echo 'unknown option' >&2; exit 1");
        let data = forward_slashes(&paths.mariadb_data_dir());
        script(&paths, "mysql_install_db", &format!("mkdir -p '{data}/mysql'"));

        assert_eq!(initialize_data_dir(&p).await.unwrap(), InitStrategy::LegacyInstallDb);
        assert_eq!(
            initialize_data_dir(&p).await.unwrap(),
            InitStrategy::AlreadyInitialized
        );
    }

    #[tokio::test]
    async fn every_strategy_failing_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), 13308);
        script(&p.paths(), "mysqld", "echo 'cannot initialize' >&2; exit 2");

        let err = initialize_data_dir(&p).await.unwrap_err();
        match err.downcast_ref::<StackError>() {
            Some(StackError::DatabaseInitFailed { last_error }) => {
                assert!(last_error.contains("cannot initialize"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn credentials_script_is_sourced_then_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), 13309);
        let paths = p.paths();
        let seen = tmp.path().join("seen.sql");
        let seen_path = tmp.path().join("seen-path.txt");
        script(
            &paths,
            "mysql",
            &format!(
                r#"for a in "$@"; do case "$a" in "source "*) f="${{a#source }}"; cp "$f" '{}'; echo "$f" > '{}';; esac; done"#,
                seen.display(),
                seen_path.display()
            ),
        );

        apply_credentials(&p, "SELECT 1;\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&seen).unwrap(), "SELECT 1;\n");
        let used = std::fs::read_to_string(&seen_path).unwrap();
        assert!(!Path::new(used.trim()).exists());
    }

    #[tokio::test]
    async fn readiness_follows_the_tcp_port() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), port);
        script(&p.paths(), "mysqld", "sleep 30");

        let mut server = BootstrapServer::start(&p).await.unwrap();
        server.wait_until_ready(Duration::from_secs(5)).await.unwrap();
        // No mysqladmin: shutdown falls back to killing the process.
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn early_exit_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), 1);
        script(&p.paths(), "mysqld", "exit 3");

        let mut server = BootstrapServer::start(&p).await.unwrap();
        let err = server
            .wait_until_ready(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[test]
    fn credential_error_outranks_shutdown_error() {
        let err = settle(
            Err(anyhow::anyhow!("applying credentials failed")),
            Err(anyhow::anyhow!("failed to kill")),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "applying credentials failed");

        let err = settle(Ok(()), Err(anyhow::anyhow!("failed to kill"))).unwrap_err();
        assert_eq!(err.to_string(), "failed to kill");
        assert!(settle(Ok(()), Ok(())).is_ok());
    }

    #[tokio::test]
    async fn bootstrap_reports_the_credential_failure() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let tmp = tempfile::tempdir().unwrap();
        let p = params(tmp.path(), port);
        let paths = p.paths();
        std::fs::create_dir_all(system_tables(&paths)).unwrap();
        script(&paths, "mysqld", "sleep 30");
        script(&paths, "mysql", "echo 'ERROR 1045: Access denied' >&2; exit 1");

        let err = bootstrap_database(&p, "SELECT 1;\n").await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("applying credentials failed"), "{message}");
        assert!(message.contains("Access denied"), "{message}");
    }
}
