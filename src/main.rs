//! Mongo Cache - A durable TTL-aware key/value cache server
//!
//! Serves a MongoDB-backed cache over HTTP with a background reclamation task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mongo_cache::api::{create_router, AppState};
use mongo_cache::{
    Config, DocumentCache, DocumentStore, MemoryStore, MongoStore, ReclaimTask, StoreBackend,
};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the configured document store
/// 4. Prepare the collection and start the reclamation task
/// 5. Serve the router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mongo_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mongo Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, database={}, collection={}, persist={}, port={}, reclaim_interval={}s",
        config.backend,
        config.database,
        config.collection,
        config.persist,
        config.server_port,
        config.reclaim_interval_secs
    );

    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::MongoDb => Arc::new(
            MongoStore::connect(&config)
                .await
                .with_context(|| format!("failed to connect to {}", config.mongo_uri))?,
        ),
        StoreBackend::Memory => {
            warn!("Using the in-memory store; entries will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let (cache, reclaimer) = DocumentCache::new(store, &config)
        .open(config.reclaim_period())
        .await
        .context("failed to initialize the cache collection")?;
    info!("Cache initialized, reclamation task started");

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(reclaimer))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the reclamation task.
async fn shutdown_signal(reclaimer: ReclaimTask) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    reclaimer.stop();
    warn!("Reclamation task stopped");
}
