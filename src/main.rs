//! CLI entry point for aniqueue.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

mod app_config;
mod cli;
mod commands;

use aniqueue_core::tracker::default_config_dir;
use app_config::{DEFAULT_DATABASE_FILE, FileConfig, LoadedConfig, load_default_file_config};
use cli::{AuthCommand, Cli, Command, ConfigCommand, StatusArgs, TrackerCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let loaded = load_default_file_config()?;
    let config = loaded.effective();

    init_tracing(&cli, &config);
    debug!(?cli, config_loaded = loaded.loaded_from_file, "CLI arguments parsed");

    let db_path = resolve_database_path(cli.db.as_ref(), &config)?;

    match cli.command.unwrap_or_else(|| Command::Status(StatusArgs::default())) {
        Command::Status(args) => commands::run_status_command(&db_path, &args).await?,
        Command::Queue { command } => commands::run_queue_command(&db_path, command).await?,
        Command::Auth { command } => match command {
            AuthCommand::Login { tracker } => {
                commands::run_auth_login_command(tracker, &config).await?;
            }
            AuthCommand::Logout { tracker } => commands::run_auth_logout_command(tracker).await?,
            AuthCommand::Status => commands::run_auth_status_command()?,
        },
        Command::Tracker { command } => match command {
            TrackerCommand::Get { tracker, url } => {
                commands::run_tracker_get_command(tracker, url, &config).await?;
            }
        },
        Command::Config { command } => match command {
            ConfigCommand::Show => run_config_show(&loaded, &config, &db_path),
        },
    }

    Ok(())
}

/// Priority: `RUST_LOG` > `-q` > `-v` count > config verbosity > info.
fn init_tracing(cli: &Cli, config: &FileConfig) {
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.verbosity.map_or("info", |v| v.log_level()),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_database_path(flag: Option<&PathBuf>, config: &FileConfig) -> Result<PathBuf> {
    if let Some(path) = flag.or(config.database_path.as_ref()) {
        return Ok(path.clone());
    }
    let dir = default_config_dir().context("Cannot locate a directory for the transfer database")?;
    Ok(dir.join(DEFAULT_DATABASE_FILE))
}

fn run_config_show(loaded: &LoadedConfig, config: &FileConfig, db_path: &std::path::Path) {
    let resolved_path = loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("database_path = {}", db_path.display());
    println!(
        "verbosity = {}",
        config.verbosity.map_or("default", |v| v.as_str())
    );
    println!(
        "mal_client_id = {}",
        config.mal_client_id.as_deref().unwrap_or("<unset>")
    );
    println!(
        "anilist_client_id = {}",
        config.anilist_client_id.as_deref().unwrap_or("<unset>")
    );
    println!(
        "connect_timeout_secs = {}",
        commands::connect_timeout_secs(config)
    );
    println!("read_timeout_secs = {}", commands::read_timeout_secs(config));
}
