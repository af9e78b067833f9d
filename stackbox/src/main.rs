mod progress;
mod prompt;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use progress::TerminalReporter;
use stackbox_lib::stack::config::params::{
    ParameterSet, DEFAULT_APP_PORT, DEFAULT_DB_NAME, DEFAULT_DB_PORT, DEFAULT_DB_USER,
};
use stackbox_lib::stack::config::{existing_app_secret, synthesize};
use stackbox_lib::stack::database::bootstrap_database;
use stackbox_lib::stack::installer::config::{build_http_client, PROBE_TIMEOUT};
use stackbox_lib::stack::installer::core::probe::probe_url;
use stackbox_lib::stack::installer::{AcquireOutcome, ArtifactSource, InstallOptions, StackInstaller};
use stackbox_lib::stack::metadata::sources::source_for;
use stackbox_lib::stack::metadata::{Discoverer, LocationCache};
use stackbox_lib::{Component, StackPaths};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "stackbox")]
#[command(about = "Provision a portable Apache, PHP, MariaDB and Composer stack", long_about = None)]
struct Cli {
    /// Stack root directory (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and install every component, then configure the stack
    Install {
        #[command(flatten)]
        stack: StackArgs,
        /// Ignore cached download locations
        #[arg(long)]
        no_cache: bool,
        /// Do not initialize MariaDB or create the application user
        #[arg(long)]
        skip_database: bool,
    },
    /// Regenerate configuration files for already installed components
    Configure {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// Print the candidate download locations for one component
    Resolve {
        #[arg(value_parser = parse_component)]
        component: Component,
        #[arg(long)]
        no_cache: bool,
    },
    /// Check whether a URL is reachable and how large it claims to be
    Probe { url: String },
}

#[derive(Args, Debug)]
struct StackArgs {
    #[arg(long, default_value_t = DEFAULT_APP_PORT)]
    app_port: u16,
    #[arg(long, default_value_t = DEFAULT_DB_PORT)]
    db_port: u16,
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    db_name: String,
    #[arg(long, default_value = DEFAULT_DB_USER)]
    db_user: String,
    #[arg(long, default_value = "")]
    db_password: String,
}

fn parse_component(input: &str) -> Result<Component, String> {
    Component::parse(input).ok_or_else(|| {
        let known: Vec<&str> = Component::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown component '{input}' (expected one of: {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    let paths = StackPaths::new(root);

    match cli.command {
        Commands::Install {
            stack,
            no_cache,
            skip_database,
        } => install(paths, stack, no_cache, skip_database).await,
        Commands::Configure { stack } => {
            let params = parameters(&paths, &stack).await?;
            synthesize(&params).await?;
            println!("Configuration written under {}", paths.root().display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve {
            component,
            no_cache,
        } => {
            let client = build_http_client()?;
            let cache = LocationCache::load(paths.location_cache_file()).await;
            let mut discoverer = Discoverer::new(client, cache, !no_cache);
            let source = source_for(component);
            let candidates = discoverer
                .discover(source.as_ref(), Some(component.min_size()))
                .await;
            for candidate in candidates {
                match candidate.sha256 {
                    Some(digest) => println!("{}  sha256:{}", candidate.url, digest),
                    None => println!("{}", candidate.url),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe { url } => {
            let client = build_http_client()?;
            let result = probe_url(&client, &url, PROBE_TIMEOUT).await;
            let status = result
                .status
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let length = result
                .content_length
                .map_or_else(|| "unknown".to_string(), |l| l.to_string());
            println!("{url}\n  status: {status}\n  length: {length}");
            if let Some(error) = result.error {
                println!("  error: {error}");
            }
            Ok(if result.accessible {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Keep the application key from an earlier run so encrypted data survives
/// reconfiguration.
async fn parameters(paths: &StackPaths, args: &StackArgs) -> Result<ParameterSet> {
    let params = match existing_app_secret(paths).await {
        Some(secret) => ParameterSet::with_secret(
            paths.root(),
            args.app_port,
            args.db_port,
            &args.db_name,
            &args.db_user,
            &args.db_password,
            secret,
        ),
        None => ParameterSet::new(
            paths.root(),
            args.app_port,
            args.db_port,
            &args.db_name,
            &args.db_user,
            &args.db_password,
        ),
    };
    Ok(params?)
}

async fn install(
    paths: StackPaths,
    args: StackArgs,
    no_cache: bool,
    skip_database: bool,
) -> Result<ExitCode> {
    let params = parameters(&paths, &args).await?;
    let client = build_http_client()?;
    let options = InstallOptions {
        use_cache: !no_cache,
        ..InstallOptions::default()
    };
    let mut installer = StackInstaller::new(paths.clone(), client, options).await;
    let reporter = TerminalReporter::default();

    for component in Component::ALL {
        let installed = match installer.ensure_component(component, &reporter).await {
            Ok(AcquireOutcome::AlreadyInstalled) => true,
            Ok(AcquireOutcome::Installed { source }) => {
                match source {
                    ArtifactSource::Reused => log::info!("{}: reused existing download", component),
                    ArtifactSource::Downloaded(candidate) => {
                        log::info!("{}: downloaded from {}", component, candidate.url)
                    }
                    ArtifactSource::Manual(file) => {
                        log::info!("{}: installed from {}", component, file.display())
                    }
                }
                true
            }
            Ok(AcquireOutcome::NeedsManualIntervention(manual)) => {
                prompt::manual_loop(&mut installer, &manual, &reporter).await?
            }
            Err(e) => {
                reporter.suspend();
                log::error!("{}: {:#}", component, e);
                false
            }
        };

        if installed {
            continue;
        }
        if !component.is_required() {
            log::warn!(
                "{} is optional; continuing without it",
                component.display_name()
            );
            continue;
        }
        let proceed = prompt::confirm(&format!(
            "{} is required. Continue anyway?",
            component.display_name()
        ))
        .await?;
        if !proceed {
            log::error!("Aborted: {} is not installed", component.display_name());
            return Ok(ExitCode::FAILURE);
        }
    }

    let stats = installer.stats();
    log::info!(
        "Downloads: {} attempted, {} succeeded, {} failed, {} bytes in {:.1}s",
        stats.attempted,
        stats.succeeded,
        stats.failed,
        stats.bytes,
        stats.elapsed.as_secs_f64()
    );

    let artifacts = synthesize(&params).await?;

    if skip_database {
        log::info!("Skipping database bootstrap");
    } else if paths.is_installed(Component::MariaDb) {
        bootstrap_database(&params, &artifacts.credentials_sql).await?;
    } else {
        log::warn!("MariaDB is not installed; skipping database bootstrap");
    }

    println!(
        "\nStack ready at {}\n  app:      {}\n  database: 127.0.0.1:{} ({} as {})",
        paths.root().display(),
        params.app_url(),
        params.db_port,
        params.db_name,
        params.db_user
    );
    Ok(ExitCode::SUCCESS)
}
