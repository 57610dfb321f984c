//! linetrace-station - shop-floor traceability station
//!
//! Pairs scanned serial numbers with production orders, keeps the day's
//! post-production checklist queue and stores checklist answers with their
//! evidence photos.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linetrace_common::config::StationConfig;
use linetrace_common::storage::{FsObjectStorage, ObjectStorage};
use linetrace_common::store::{RecordStore, SqliteRecordStore};
use linetrace_common::time::{Clock, SystemClock};
use linetrace_station::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for linetrace-station
#[derive(Parser, Debug)]
#[command(name = "linetrace-station")]
#[command(about = "Unit traceability and post-production checklist station")]
#[command(version)]
struct Args {
    /// Configuration file (overrides LINETRACE_CONFIG and platform config files)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "LINETRACE_PORT")]
    port: Option<u16>,

    /// SQLite database path (overrides the configuration file)
    #[arg(long, env = "LINETRACE_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = StationConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "linetrace_station={level},linetrace_common={level},tower_http=info"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting LineTrace station (linetrace-station) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Timezone: {}", config.timezone);
    info!(
        "Policies: dedup={:?} on_duplicate={:?} completion={:?} complement={:?}",
        config.policies.dedup_key,
        config.policies.on_duplicate,
        config.policies.completion_marker,
        config.policies.complement_encoding
    );

    info!("Database path: {}", config.database_path.display());
    let backend: Arc<dyn RecordStore> = Arc::new(
        SqliteRecordStore::open(&config.database_path)
            .await
            .context("Failed to open record store")?,
    );
    info!("✓ Record store ready");

    std::fs::create_dir_all(&config.evidence_root).with_context(|| {
        format!("Failed to create evidence folder {}", config.evidence_root.display())
    })?;
    info!("Evidence folder: {}", config.evidence_root.display());
    let storage: Arc<dyn ObjectStorage> = Arc::new(FsObjectStorage::new(
        config.evidence_root.clone(),
        config.public_base_url.clone(),
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let port = config.port;
    let state = AppState::new(config, backend, Some(storage), clock)
        .context("Failed to initialize station")?;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("linetrace-station listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
