//! Tabula API Server Entry Point
//!
//! Loads configuration, builds the catalog and starts the Axum HTTP server.

use std::sync::Arc;

use tabula_api::telemetry::{init_tracing, LogFormat};
use tabula_api::{create_router, ApiError, ApiResult, Dispatcher, ServerConfig};
use tabula_storage::{Catalog, InMemorySheetStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let config = ServerConfig::load()?;
    let addr = config.bind_addr()?;

    let store = Arc::new(InMemorySheetStore::new());
    let catalog = Catalog::new(store, config.engine.clone())?;
    tracing::info!(
        tables = config.engine.tables.len(),
        keys = config.auth.key_count(),
        "catalog ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(catalog), config.auth));
    let app = create_router(dispatcher);

    tracing::info!(%addr, "Starting Tabula API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
