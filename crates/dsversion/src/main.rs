//! dsversion - dataset versioning for data catalogs.
//!
//! This is the main entry point for the dsversion CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dsversion_core::{backfill, init_db, Host, InitOutcome, MemoryHost, Versioning, VersionsConfig};
use dsversion_server::{create_router, AppState};
use dsversion_storage::{JsonVersionStore, VersionStore};
use dsversion_util::log::{LogConfig, LogLevel};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dsversion")]
#[command(author, version, about = "Dataset versioning for data catalogs", long_about = None)]
struct Cli {
    /// Configuration file (defaults to dsversion.jsonc or dsversion.json in
    /// the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the version table
    InitDb,
    /// Give every resource without versions an initial version
    Backfill {
        /// Catalog file
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Serve the versioned download redirect and the JSON API
    Serve {
        /// Catalog file
        #[arg(long)]
        catalog: PathBuf,
        /// Address to bind to (overrides the configuration)
        #[arg(short, long)]
        address: Option<SocketAddr>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let (config, source) = VersionsConfig::load(cli.config.as_deref(), Some(cwd.as_path())).await?;

    init_logging(&config, cli.verbose, matches!(cli.command, Commands::Serve { .. }));
    match &source {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("Using default configuration"),
    }

    match cli.command {
        Commands::InitDb => run_init_db(&config).await,
        Commands::Backfill { catalog } => run_backfill(config, &catalog).await,
        Commands::Serve { catalog, address } => run_server(config, &catalog, address).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Initialize logging. `--verbose` wins over the configured level.
fn init_logging(config: &VersionsConfig, verbose: bool, http: bool) {
    let level = if verbose {
        LogLevel::Debug
    } else {
        config
            .log_level
            .as_deref()
            .and_then(LogLevel::parse)
            .unwrap_or_default()
    };

    dsversion_util::log::init(LogConfig {
        level,
        http,
        ..LogConfig::default()
    });
}

fn open_store(config: &VersionsConfig) -> anyhow::Result<JsonVersionStore> {
    let dir = config
        .storage_dir()
        .context("No data directory available; set DSVERSION_STORAGE_PATH")?;
    Ok(JsonVersionStore::new(dir))
}

/// Load the catalog and persist it straight away, so activities synthesized
/// on load keep their ids across runs.
async fn open_catalog(path: &Path) -> anyhow::Result<Arc<MemoryHost>> {
    let host = MemoryHost::load(path)
        .await
        .with_context(|| format!("Failed to load catalog {}", path.display()))?;
    host.save(path).await?;
    Ok(Arc::new(host))
}

async fn run_init_db(config: &VersionsConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match init_db(&store).await? {
        InitOutcome::Created => println!("Version table created at {}", store.table_path().display()),
        InitOutcome::AlreadyExists => println!(
            "Version table already exists at {}",
            store.table_path().display()
        ),
    }
    Ok(())
}

async fn run_backfill(config: VersionsConfig, catalog: &Path) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    if !store.tables_exist().await? {
        anyhow::bail!("Version table missing; run `dsversion init-db` first");
    }

    let host = open_catalog(catalog).await?;
    let versioning = Versioning::new(Host::from_shared(host), Arc::new(store), config);
    let report = backfill(&versioning.versions).await?;

    println!(
        "Created {} initial versions ({} resources already versioned, {} skipped)",
        report.created, report.existing, report.skipped
    );
    Ok(())
}

async fn run_server(
    config: VersionsConfig,
    catalog: &Path,
    address: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let address = match address {
        Some(address) => address,
        None => config
            .server
            .address
            .parse()
            .with_context(|| format!("Invalid server address {}", config.server.address))?,
    };

    let store = open_store(&config)?;
    if init_db(&store).await? == InitOutcome::Created {
        warn!(path = %store.table_path().display(), "Version table was missing and has been created");
    }

    let host = open_catalog(catalog).await?;
    let versioning = Versioning::new(Host::from_shared(host.clone()), Arc::new(store), config);
    let app = create_router(AppState::new(versioning));

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Server listening on http://{}", address);
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    host.save(catalog).await?;
    info!(path = %catalog.display(), "Saved catalog");
    Ok(())
}
