//! eventvault API server entry point.

use std::sync::Arc;

use eventvault_api::config::ServerConfig;
use eventvault_api::error::AppError;
use eventvault_api::publisher::TracingPublisher;
use eventvault_api::state::AppState;
use eventvault_api::{build_router, storage};
use eventvault_engine::Eventstore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting eventvault API server");

    let config = ServerConfig::from_env()?;
    let adapter = storage::build_adapter(&config)?;

    let mut builder = Eventstore::builder(adapter).options(config.eventstore_options());
    if config.dispatch_enabled {
        builder = builder.publisher(Arc::new(TracingPublisher));
    }
    let eventstore = Arc::new(builder.build());
    eventstore.init().await?;
    tracing::info!(storage = ?config.storage, dispatch = config.dispatch_enabled, "eventstore ready");

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = build_router(AppState::new(eventstore.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.addr()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eventstore.close().await?;
    tracing::info!("eventvault API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "listening for shutdown signal failed");
        std::future::pending::<()>().await;
    }
}
