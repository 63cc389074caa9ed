//! Ofistur Ledger Server Binary

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ofistur_ledger::{LedgerEngine, LedgerStore, MemoryLedgerStore, PgLedgerStore};
use ofistur_server::{router, AppState, ServerConfig, StorageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Ofistur credit ledger server");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store: Arc<dyn LedgerStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let store = PgLedgerStore::connect(&config.database_url, config.db_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; ledger data is lost on shutdown");
            let store = MemoryLedgerStore::new();
            for (agency_id, subject) in &config.memory_subjects {
                store.register_subject(*agency_id, *subject);
            }
            Arc::new(store)
        }
    };

    let engine = LedgerEngine::new(store, config.ledger.clone());
    let app = router(AppState::new(engine, config.storage_backend));

    let addr = config
        .listen_socket()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        listen_addr = %addr,
        storage = config.storage_backend.as_str(),
        "Credit ledger server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
