use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wl_cli::commands::{summary, tasks, work};
use wl_cli::{Backend, Cli, Commands, Config};
use wl_core::{Store, Tracker};
use wl_db::Database;
use wl_remote::RemoteStore;

/// Open the local database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Runs one command against whichever backend was configured.
fn dispatch<S: Store, W: Write>(
    writer: &mut W,
    cli: &Cli,
    command: &Commands,
    config: &Config,
    store: S,
) -> Result<()> {
    let tracker = Tracker::new(store).with_day_zone(config.day_zone);
    let owner = config
        .owner_id(cli.owner.as_deref())
        .context("no owner configured; set `owner` or pass --owner")?;

    match command {
        Commands::Add(args) => tasks::add(writer, &tracker, &owner, args),
        Commands::List(args) => tasks::list(writer, &tracker, &owner, args),
        Commands::Edit(args) => tasks::edit(writer, &tracker, &owner, args),
        Commands::Delete { id } => tasks::delete(writer, &tracker, &owner, id),
        Commands::Complete { id } => tasks::complete(writer, &tracker, &owner, id),
        Commands::Start { id } => work::start(writer, &tracker, &owner, id),
        Commands::Stop => work::stop(writer, &tracker, &owner),
        Commands::Status => work::status(writer, &tracker, &owner),
        Commands::Summary(args) => {
            summary::run(writer, &tracker, &owner, args, config.week_start)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout().lock();
    match config.backend {
        Backend::Local => {
            let db = open_database(&config)?;
            dispatch(&mut stdout, &cli, command, &config, db)
        }
        Backend::Remote => {
            let remote = config.remote_config()?;
            let store = RemoteStore::new(remote).context("failed to create remote client")?;
            dispatch(&mut stdout, &cli, command, &config, store)
        }
    }
}
