//! Route definitions

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    analyze, chat, chat_complete, generate_image, health, load_model, load_status, model_status,
    model_status_all, root,
};
use crate::Runtime;

/// Largest accepted request body, sized for image uploads.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Create the API router.
pub fn api_routes() -> Router<Arc<Runtime>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Slot lifecycle
        .route("/api/model-status", get(model_status))
        .route("/api/model-status/all", get(model_status_all))
        .route("/api/load-model", post(load_model))
        .route("/api/load-model/:id", get(load_status))
        // Generation
        .route("/api/chat", post(chat))
        .route("/api/chat/complete", post(chat_complete))
        .route("/api/generate-image", post(generate_image))
        .route("/api/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
