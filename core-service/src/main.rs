//! tunecache server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_cache::CacheStore;
use core_runtime::config::ServerConfig;
use core_runtime::logging::init_logging;
use core_service::{cache_config, create_router, AppState};
use std::path::PathBuf;

/// tunecache - a caching proxy for a personal music catalog
#[derive(Parser, Debug)]
#[command(name = "tunecached")]
#[command(version, about, long_about = None)]
struct Args {
    /// Override CACHE_DIR
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Rebuild the SQLite index from the files on disk
    RebuildIndex,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(dir) = args.cache_dir {
        config = config.with_cache_dir(dir);
        config.validate().context("invalid configuration")?;
    }

    init_logging(config.logging.clone()).context("failed to initialize logging")?;
    tracing::info!("tunecache v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::RebuildIndex => rebuild_index(config).await,
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let addr = config.bind_address();
    tracing::debug!(config = ?config, "Loaded configuration");

    let state = AppState::bootstrap(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn rebuild_index(config: ServerConfig) -> Result<()> {
    let cache = cache_config(&config.cache);
    let index_path = cache.index_path();

    let store = CacheStore::connect(cache)
        .await
        .context("failed to open cache index")?;
    let report = store
        .rebuild_index()
        .await
        .context("index rebuild failed")?;

    let summary = serde_json::json!({
        "baseDir": store.base_dir().display().to_string(),
        "indexPath": index_path.display().to_string(),
        "inserted": report.inserted,
        "skipped": report.skipped,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
