//! HTTP surface of the runtime.

mod error;
mod handlers;
mod routes;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Runtime;

pub use error::ApiError;
pub use handlers::DEFAULT_ANALYZE_PROMPT;
pub use routes::{api_routes, MAX_BODY_BYTES};
pub use types::{
    AnalyzeResponse, ChatRequest, ChatResponse, ImageRequest, ImageResponse, LoadAccepted,
    LoadModelRequest, LoadStatusResponse,
};

/// Build the full application router around a runtime.
pub fn router(runtime: Arc<Runtime>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

/// Serve until Ctrl-C, then shut the runtime down gracefully.
pub async fn serve(runtime: Arc<Runtime>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /api/model-status - Slot status");
    tracing::info!("  POST /api/load-model - Queue a model load");
    tracing::info!("  POST /api/chat - Streamed chat");
    tracing::info!("  POST /api/generate-image - Image synthesis");
    tracing::info!("  POST /api/analyze - Vision analysis");

    let app = router(runtime.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
            runtime.shutdown().await;
        })
        .await
}
