//! SoundLens - Main entry point
//!
//! Wires the capture pipeline, the recognition client, the history store
//! and the sync engine together behind the HTTP/SSE API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soundlens_app::api;
use soundlens_app::capture::{CaptureEngine, CpalInput};
use soundlens_app::config::Config;
use soundlens_app::history::{HistoryStore, LocalCache};
use soundlens_app::recognize::AcrCloudClient;
use soundlens_app::state::SharedState;
use soundlens_app::sync::{HttpRemoteHistory, RemoteHistory, SyncEngine};

/// Command-line arguments for soundlens-app
#[derive(Parser, Debug)]
#[command(name = "soundlens-app")]
#[command(about = "Progressive audio recognition service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "soundlens.toml", env = "SOUNDLENS_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "SOUNDLENS_PORT")]
    port: Option<u16>,

    /// SQLite database path (overrides the config file)
    #[arg(short, long, env = "SOUNDLENS_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soundlens_app=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let mut config = Config::load(&args.config).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    info!("Starting SoundLens on port {}", config.port);
    info!("Database: {}", config.database_path.display());

    let pool = soundlens_common::db::init::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let cache = LocalCache::new(pool);

    let state = Arc::new(SharedState::new());
    let store = Arc::new(HistoryStore::new(
        cache.clone(),
        &config.history,
        Arc::clone(&state),
    ));

    let (remote, page_size) = match &config.remote {
        Some(remote_config) => {
            info!("Remote history sync enabled: {}", remote_config.base_url);
            let remote: Arc<dyn RemoteHistory> = Arc::new(
                HttpRemoteHistory::new(remote_config)
                    .context("Failed to initialize remote history client")?,
            );
            (Some(remote), remote_config.page_size)
        }
        None => {
            info!("Remote history sync disabled");
            (None, 0)
        }
    };

    let sync = Arc::new(
        SyncEngine::new(remote, Arc::clone(&store), cache, Arc::clone(&state), page_size)
            .await
            .context("Failed to initialize sync engine")?,
    );

    // Show the cached history immediately, then fold in the first remote
    // page in the background
    store
        .seed_from_cache()
        .await
        .context("Failed to seed history from cache")?;
    {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move {
            sync.load_more().await;
        });
    }

    let recognizer = Arc::new(
        AcrCloudClient::new(&config.provider)
            .context("Failed to initialize recognition client")?,
    );

    let engine = Arc::new(CaptureEngine::new(
        config.capture.clone(),
        Arc::new(CpalInput::new()),
        recognizer,
        Arc::clone(&store),
        Arc::clone(&sync),
        Arc::clone(&state),
    ));
    info!("Capture engine initialized");

    // Build the application router
    let app_state = api::AppState {
        engine,
        store,
        sync,
        state,
        port: config.port,
    };

    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
